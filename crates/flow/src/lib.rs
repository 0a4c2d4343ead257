pub mod controller;
pub mod store;
pub mod timer;

pub use controller::{
    AvatarGenerationError, BootstrapError, ControllerConfig, FlowEvent, LaunchParams,
    PhaseController, FALLBACK_BOT_REPLY, MAX_AVATAR_GENERATIONS,
};
pub use store::{SessionStore, TranscriptStore, THINKING_TEXT};
pub use timer::Countdown;
