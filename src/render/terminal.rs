//! Line-oriented terminal renderer.
//!
//! A terminal has no rows to overwrite, so interim updates reprint and
//! finals print once. Lanes are labelled with their language code; the
//! correlator owns scrollback, so eviction is a no-op here.

use crate::correlator::{RenderSink, RowKind, ORIGINAL_LANE};

pub struct TerminalSink {
    lane_labels: Vec<Option<String>>,
}

impl TerminalSink {
    pub fn new(max_translation_lanes: usize) -> Self {
        Self {
            lane_labels: vec![None; max_translation_lanes + 1],
        }
    }

    fn label(&self, lane: usize) -> &str {
        if lane == ORIGINAL_LANE {
            return "orig";
        }
        self.lane_labels
            .get(lane)
            .and_then(|l| l.as_deref())
            .unwrap_or("?")
    }
}

impl RenderSink for TerminalSink {
    fn upsert_row(&mut self, lane: usize, id: Option<&str>, text: &str, kind: RowKind) {
        match kind {
            RowKind::Interim => println!("[{}] ... {}", self.label(lane), text),
            RowKind::Final => match id {
                Some(id) => println!("[{}] {} {}", self.label(lane), id, text),
                None => println!("[{}] {}", self.label(lane), text),
            },
            // Placeholders only become visible once translated.
            RowKind::Pending => {}
        }
    }

    fn evict_overflow(&mut self, _lane: usize, _bound: usize) {}

    fn assign_lane(&mut self, lane: usize, lang: Option<&str>) {
        if let Some(slot) = self.lane_labels.get_mut(lane) {
            *slot = lang.map(String::from);
        }
        match lang {
            Some(lang) => println!("-- lane {} now shows {} --", lane, lang),
            None => println!("-- lane {} hidden --", lane),
        }
    }

    fn clear_lane(&mut self, _lane: usize) {}
}
