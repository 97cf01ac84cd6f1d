pub mod audio;
pub mod cli;
pub mod correlator;
pub mod languages;
pub mod protocol;
pub mod render;
pub mod session;
pub mod settings;
pub mod transport;

pub use audio::{AcquireError, AudioSource, CaptureMode, DefaultSourceFactory, SourceFactory};
pub use correlator::{LaneBuffer, RenderSink, ResultCorrelator, RowKind};
pub use languages::TranslationEngine;
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{SessionController, SessionEvent, SessionState, StopReason};
pub use settings::{SessionSettings, SettingsSync};
pub use transport::{Role, TransportChannel, TransportConfig, TransportEvent, TransportState};
