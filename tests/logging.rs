//! The log level belongs to the first `run` an engine accepts.
//!
//! Kept in its own test binary: the `log` max level is process-wide.

use netmux::{Configuration, Engine, EngineCore, EngineError, LogLevel};

#[test]
fn rejected_runs_leave_log_level_untouched() {
    let engine = EngineCore::new();
    engine
        .run(Configuration::text("{}"), LogLevel::Info, None)
        .expect("engine run");
    assert_eq!(log::max_level(), log::LevelFilter::Info);

    assert_eq!(
        engine.run(Configuration::text("{}"), LogLevel::Off, None),
        Err(EngineError::AlreadyRunning)
    );
    assert_eq!(log::max_level(), log::LevelFilter::Info);

    let failed = EngineCore::new();
    assert!(failed
        .run(Configuration::text("not json"), LogLevel::Warn, None)
        .is_err());
    assert_eq!(log::max_level(), log::LevelFilter::Warn);

    assert_eq!(
        failed.run(Configuration::text("{}"), LogLevel::Trace, None),
        Err(EngineError::Terminated)
    );
    assert_eq!(log::max_level(), log::LevelFilter::Warn);
}
