//! Correlation of recognition results to rendered rows.
//!
//! The server emits interim fragments, finalized segments with ids, and
//! per-language translations keyed by those ids. This module turns that
//! stream into bounded per-lane row buffers and drives a `RenderSink`
//! with the resulting mutations.

use crate::protocol::{InitialSettings, ServerMessage};
use log::{debug, warn};
use std::collections::VecDeque;

/// Lane index of the original-transcript column.
pub const ORIGINAL_LANE: usize = 0;
/// Rows kept per lane in the controller view.
pub const CONTROLLER_SCROLLBACK: usize = 4;
/// Rows kept per lane in the watch view.
pub const WATCH_SCROLLBACK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// Provisional text, overwritten in place by the next interim.
    Interim,
    /// Finalized segment text.
    Final,
    /// Placeholder awaiting a translation.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneRow {
    /// Server correlation id; interim rows have none yet.
    pub id: Option<String>,
    pub text: String,
    pub kind: RowKind,
}

/// Rendering capability the correlator drives. Implementations render
/// rows however they like; the correlator owns all correlation state.
pub trait RenderSink {
    /// Create or replace the row identified by `(lane, id)`; an interim
    /// row (`id == None`) always replaces the previous interim row.
    fn upsert_row(&mut self, lane: usize, id: Option<&str>, text: &str, kind: RowKind);

    /// Drop rendered rows beyond `bound`, oldest first.
    fn evict_overflow(&mut self, lane: usize, bound: usize);

    /// Watch view: lane now shows `lang` (`None` hides the lane).
    fn assign_lane(&mut self, _lane: usize, _lang: Option<&str>) {}

    /// Remove every row in `lane`.
    fn clear_lane(&mut self, _lane: usize) {}
}

/// Bounded FIFO of rows for one lane.
#[derive(Debug)]
pub struct LaneBuffer {
    rows: VecDeque<LaneRow>,
    bound: usize,
}

impl LaneBuffer {
    fn new(bound: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(bound),
            bound,
        }
    }

    fn push(&mut self, row: LaneRow) {
        self.rows.push_back(row);
        while self.rows.len() > self.bound {
            self.rows.pop_front();
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut LaneRow> {
        self.rows
            .iter_mut()
            .find(|row| row.id.as_deref() == Some(id))
    }

    fn last_interim_mut(&mut self) -> Option<&mut LaneRow> {
        self.rows
            .iter_mut()
            .rev()
            .find(|row| row.kind == RowKind::Interim)
    }

    fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> impl Iterator<Item = &LaneRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct Lane {
    /// Language rendered in this lane; `None` for the original lane and
    /// for hidden watch lanes.
    lang: Option<String>,
    buffer: LaneBuffer,
}

/// Routes server messages into lane buffers and a render sink.
pub struct ResultCorrelator<S: RenderSink> {
    lanes: Vec<Lane>,
    bound: usize,
    /// Whether the original lane currently shows an interim row.
    has_interim: bool,
    sink: S,
}

impl<S: RenderSink> ResultCorrelator<S> {
    /// Controller view: original lane plus up to three translation
    /// lanes, 4 rows of scrollback each.
    pub fn controller(sink: S, max_translation_lanes: usize) -> Self {
        Self::new(sink, max_translation_lanes, CONTROLLER_SCROLLBACK)
    }

    /// Watch view: same shape, 10 rows of scrollback.
    pub fn watch(sink: S, max_translation_lanes: usize) -> Self {
        Self::new(sink, max_translation_lanes, WATCH_SCROLLBACK)
    }

    fn new(sink: S, max_translation_lanes: usize, bound: usize) -> Self {
        let mut lanes = Vec::with_capacity(1 + max_translation_lanes);
        for _ in 0..=max_translation_lanes {
            lanes.push(Lane {
                lang: None,
                buffer: LaneBuffer::new(bound),
            });
        }
        Self {
            lanes,
            bound,
            has_interim: false,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Drop the interim reference so the next interim starts a new row.
    /// Called at each capture-session boundary.
    pub fn reset_interim(&mut self) {
        self.has_interim = false;
    }

    /// Controller: lane `slot + 1` now collects `lang`. Existing rows
    /// stay; only future finals grow placeholders for the new language.
    pub fn set_lane_language(&mut self, slot: usize, lang: Option<&str>) {
        let lane = slot + 1;
        if lane < self.lanes.len() {
            self.lanes[lane].lang = lang.map(String::from);
            self.sink.assign_lane(lane, lang);
        }
    }

    /// Watch: apply the server's lane list in order. A lane whose
    /// language changed is cleared; slots past the list are hidden.
    pub fn apply_lane_config(&mut self, languages: &[String]) {
        for slot in 0..self.lanes.len() - 1 {
            let lane = slot + 1;
            let next = languages.get(slot).map(|l| l.as_str());
            let current = self.lanes[lane].lang.as_deref();
            if next != current {
                // Nothing to clear on a first assignment.
                if !self.lanes[lane].buffer.is_empty() {
                    self.lanes[lane].buffer.clear();
                    self.sink.clear_lane(lane);
                }
                self.lanes[lane].lang = next.map(String::from);
                self.sink.assign_lane(lane, next);
            }
        }
    }

    /// Route one inbound message. Returns the `session_init` settings
    /// when present so the caller can feed its settings layer.
    pub fn handle(&mut self, msg: &ServerMessage) -> Option<InitialSettings> {
        match msg {
            ServerMessage::InterimResult { text } => self.on_interim(text),
            ServerMessage::FinalResult { id, original } => self.on_final(id, original),
            ServerMessage::TranslationResult {
                original_id,
                lang,
                text,
            } => self.on_translation(original_id, lang, text),
            ServerMessage::Config { languages } => self.apply_lane_config(languages),
            ServerMessage::SessionInit { settings } => return Some(settings.clone()),
            ServerMessage::TuningAck { status } => {
                debug!("tuning acknowledged: {:?}", status);
            }
            ServerMessage::Unknown => {}
        }
        None
    }

    fn on_interim(&mut self, text: &str) {
        let lane = &mut self.lanes[ORIGINAL_LANE];
        if self.has_interim {
            if let Some(row) = lane.buffer.last_interim_mut() {
                row.text = text.to_string();
                self.sink.upsert_row(ORIGINAL_LANE, None, text, RowKind::Interim);
                return;
            }
            // Interim row already evicted; fall through to a new one.
        }
        lane.buffer.push(LaneRow {
            id: None,
            text: text.to_string(),
            kind: RowKind::Interim,
        });
        self.has_interim = true;
        self.sink.upsert_row(ORIGINAL_LANE, None, text, RowKind::Interim);
        self.sink.evict_overflow(ORIGINAL_LANE, self.bound);
    }

    fn on_final(&mut self, id: &str, original: &str) {
        let lane = &mut self.lanes[ORIGINAL_LANE];
        // Only an in-progress interim row gets promoted; a final arriving
        // right after a session boundary starts a fresh row.
        let promoted = self.has_interim
            && match lane.buffer.last_interim_mut() {
                Some(row) => {
                    row.id = Some(id.to_string());
                    row.text = original.to_string();
                    row.kind = RowKind::Final;
                    true
                }
                None => false,
            };
        if !promoted {
            lane.buffer.push(LaneRow {
                id: Some(id.to_string()),
                text: original.to_string(),
                kind: RowKind::Final,
            });
        }
        self.has_interim = false;
        self.sink
            .upsert_row(ORIGINAL_LANE, Some(id), original, RowKind::Final);
        self.sink.evict_overflow(ORIGINAL_LANE, self.bound);

        // One placeholder per assigned translation lane.
        for lane_idx in 1..self.lanes.len() {
            if self.lanes[lane_idx].lang.is_none() {
                continue;
            }
            self.lanes[lane_idx].buffer.push(LaneRow {
                id: Some(id.to_string()),
                text: String::new(),
                kind: RowKind::Pending,
            });
            self.sink
                .upsert_row(lane_idx, Some(id), "", RowKind::Pending);
            self.sink.evict_overflow(lane_idx, self.bound);
        }
    }

    fn on_translation(&mut self, original_id: &str, lang: &str, text: &str) {
        let mut filled = false;
        for lane_idx in 1..self.lanes.len() {
            if self.lanes[lane_idx].lang.as_deref() != Some(lang) {
                continue;
            }
            if let Some(row) = self.lanes[lane_idx].buffer.find_mut(original_id) {
                row.text = text.to_string();
                row.kind = RowKind::Final;
                self.sink
                    .upsert_row(lane_idx, Some(original_id), text, RowKind::Final);
                filled = true;
            }
        }
        if !filled {
            // Unknown id (out-of-order or evicted) or no lane shows this
            // language. Never creates a row.
            warn!(
                "dropping translation for unknown row: id={} lang={}",
                original_id, lang
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn lane_rows(&self, lane: usize) -> Vec<LaneRow> {
        self.lanes[lane].buffer.rows().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSink {
        upserts: Vec<(usize, Option<String>, String, RowKind)>,
        cleared: Vec<usize>,
        assigned: Vec<(usize, Option<String>)>,
    }

    impl RenderSink for MockSink {
        fn upsert_row(&mut self, lane: usize, id: Option<&str>, text: &str, kind: RowKind) {
            self.upserts
                .push((lane, id.map(String::from), text.to_string(), kind));
        }

        fn evict_overflow(&mut self, _lane: usize, _bound: usize) {}

        fn assign_lane(&mut self, lane: usize, lang: Option<&str>) {
            self.assigned.push((lane, lang.map(String::from)));
        }

        fn clear_lane(&mut self, lane: usize) {
            self.cleared.push(lane);
        }
    }

    fn interim(text: &str) -> ServerMessage {
        ServerMessage::InterimResult { text: text.into() }
    }

    fn final_result(id: &str, original: &str) -> ServerMessage {
        ServerMessage::FinalResult {
            id: id.into(),
            original: original.into(),
        }
    }

    fn translation(id: &str, lang: &str, text: &str) -> ServerMessage {
        ServerMessage::TranslationResult {
            original_id: id.into(),
            lang: lang.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_interim_overwrites_in_place() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        c.handle(&interim("hel"));
        c.handle(&interim("hello"));
        let rows = c.lane_rows(ORIGINAL_LANE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "hello");
        assert_eq!(rows[0].kind, RowKind::Interim);
    }

    #[test]
    fn test_final_promotes_interim_and_appends_placeholders() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        c.set_lane_language(0, Some("en"));
        c.set_lane_language(1, Some("ja"));

        c.handle(&interim("konnich"));
        c.handle(&final_result("1.0", "konnichiwa"));

        let rows = c.lane_rows(ORIGINAL_LANE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_deref(), Some("1.0"));
        assert_eq!(rows[0].kind, RowKind::Final);

        for lane in [1, 2] {
            let rows = c.lane_rows(lane);
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].kind, RowKind::Pending);
            assert_eq!(rows[0].text, "");
        }
        // Unassigned lane untouched.
        assert!(c.lane_rows(3).is_empty());

        // The next interim starts a fresh row.
        c.handle(&interim("mata"));
        assert_eq!(c.lane_rows(ORIGINAL_LANE).len(), 2);
    }

    #[test]
    fn test_translation_fills_placeholder_once() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        c.set_lane_language(0, Some("en"));
        c.handle(&final_result("1.0", "konnichiwa"));
        c.handle(&translation("1.0", "en", "hello"));

        let rows = c.lane_rows(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "hello");
        assert_eq!(rows[0].kind, RowKind::Final);
    }

    #[test]
    fn test_translation_before_final_is_dropped() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        c.set_lane_language(0, Some("en"));
        c.handle(&translation("9.9", "en", "early"));
        assert!(c.lane_rows(1).is_empty());
        assert!(c.sink().upserts.is_empty());
    }

    #[test]
    fn test_translation_for_unassigned_language_is_dropped() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        c.set_lane_language(0, Some("en"));
        c.handle(&final_result("1.0", "hola"));
        c.handle(&translation("1.0", "fr", "bonjour"));
        assert_eq!(c.lane_rows(1)[0].kind, RowKind::Pending);
    }

    #[test]
    fn test_duplicate_language_lanes_both_fill() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        c.set_lane_language(0, Some("en"));
        c.set_lane_language(2, Some("en"));
        c.handle(&final_result("1.0", "hallo"));
        c.handle(&translation("1.0", "en", "hello"));
        assert_eq!(c.lane_rows(1)[0].text, "hello");
        assert_eq!(c.lane_rows(3)[0].text, "hello");
    }

    #[test]
    fn test_lane_bound_evicts_oldest() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 1);
        for i in 0..CONTROLLER_SCROLLBACK + 3 {
            c.handle(&final_result(&format!("{}.0", i), &format!("seg {}", i)));
        }
        let rows = c.lane_rows(ORIGINAL_LANE);
        assert_eq!(rows.len(), CONTROLLER_SCROLLBACK);
        assert_eq!(rows[0].id.as_deref(), Some("3.0"));
        assert_eq!(
            rows.last().unwrap().id.as_deref(),
            Some(&*format!("{}.0", CONTROLLER_SCROLLBACK + 2))
        );
    }

    #[test]
    fn test_translation_for_evicted_row_is_dropped() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 1);
        c.set_lane_language(0, Some("en"));
        for i in 0..CONTROLLER_SCROLLBACK + 1 {
            c.handle(&final_result(&format!("{}.0", i), "x"));
        }
        // Row 0.0 has been evicted from the translation lane too.
        c.handle(&translation("0.0", "en", "late"));
        assert!(c
            .lane_rows(1)
            .iter()
            .all(|row| row.text != "late"));
    }

    #[test]
    fn test_watch_scrollback_is_deeper() {
        let mut c = ResultCorrelator::watch(MockSink::default(), 1);
        for i in 0..WATCH_SCROLLBACK + 2 {
            c.handle(&final_result(&format!("{}.0", i), "x"));
        }
        assert_eq!(c.lane_rows(ORIGINAL_LANE).len(), WATCH_SCROLLBACK);
    }

    #[test]
    fn test_watch_config_clears_changed_lanes_only() {
        let mut c = ResultCorrelator::watch(MockSink::default(), 3);
        c.handle(&ServerMessage::Config {
            languages: vec!["en".into(), "ja".into()],
        });
        // First assignment clears nothing.
        assert!(c.sink().cleared.is_empty());
        c.handle(&final_result("1.0", "hallo"));
        assert_eq!(c.lane_rows(1).len(), 1);
        assert_eq!(c.lane_rows(2).len(), 1);

        // Lane 1 keeps "en" and its rows; lane 2 flips to "fr" and clears;
        // lane 3 stays hidden.
        c.handle(&ServerMessage::Config {
            languages: vec!["en".into(), "fr".into()],
        });
        assert_eq!(c.lane_rows(1).len(), 1);
        assert!(c.lane_rows(2).is_empty());
        assert_eq!(c.sink().cleared, vec![2]);

        // Shrinking the list hides and clears the surplus lane.
        c.handle(&ServerMessage::Config {
            languages: vec!["en".into()],
        });
        assert!(c.lane_rows(2).is_empty());
    }

    #[test]
    fn test_session_init_is_surfaced_to_caller() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 3);
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"session_init","settings":{"silence_threshold":0.8,"translation_engine":"deepl"}}"#,
        )
        .unwrap();
        let init = c.handle(&msg).unwrap();
        assert_eq!(init.translation_engine, "deepl");
    }

    #[test]
    fn test_final_after_reset_does_not_promote_stale_interim() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 1);
        c.handle(&interim("leftover"));
        c.reset_interim();
        c.handle(&final_result("1.0", "fresh"));

        let rows = c.lane_rows(ORIGINAL_LANE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "leftover");
        assert_eq!(rows[0].kind, RowKind::Interim);
        assert_eq!(rows[1].id.as_deref(), Some("1.0"));
        assert_eq!(rows[1].text, "fresh");
        assert_eq!(rows[1].kind, RowKind::Final);
    }

    #[test]
    fn test_reset_interim_starts_new_row() {
        let mut c = ResultCorrelator::controller(MockSink::default(), 1);
        c.handle(&interim("first"));
        c.reset_interim();
        c.handle(&interim("second"));
        let rows = c.lane_rows(ORIGINAL_LANE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text, "second");
    }
}
