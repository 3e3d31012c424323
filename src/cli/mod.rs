pub(crate) mod classify;
pub(crate) mod command;
pub(crate) mod modules;
pub(crate) mod permissions;
pub(crate) mod scan;
pub(crate) mod ui;

pub use self::classify::ClassifyArgs;
pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::modules::ModulesArgs;
pub use self::scan::ScanArgs;
