pub mod archiver;
pub mod backup_config;
pub mod database;
pub mod job;
pub mod notifications;
pub mod planner;
pub mod pool;
pub mod redacted;
pub mod remote;
pub mod result_error;
pub mod retention;
pub mod runner;
pub mod settings;
pub mod target;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
