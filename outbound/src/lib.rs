pub mod commands;
pub mod handlers;

pub use commands::{CLAP_STYLING, DEFAULT_PROFILE_PATH, command_argument_builder};
pub use handlers::{
    Engine, ProfileOverrides, init_logging, load_profile, require_login, resolve_seed,
    write_default_profile, write_report,
};
