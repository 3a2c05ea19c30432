mod config;
mod error_util;
mod export;

use anyhow::Result;
use error_util::{AnyhowExt, SourceNotFound};
use log::{debug, error, LevelFilter};
use log4rs::{
    self,
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::{env, path::Path, process};

const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S %Z)} {M}:{f}:{L} {l} {T} {t} - {m}{n}";

/// Parses `path` as a log4rs config. A broken file is reported and ignored.
fn read_log_config(path: &Path) -> Option<Config> {
    match log4rs::config::load_config_file(path, Default::default()) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("ignoring {}: {:#}", path.display(), e);
            None
        }
    }
}

fn init_log_from_file() -> bool {
    let log_config_paths = ["config/log4rs.toml", "config/log4rs.yaml"];
    log_config_paths
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .and_then(read_log_config)
        .map(|config| log4rs::init_config(config).is_ok())
        .unwrap_or(false)
}

fn init_log() -> Result<()> {
    if init_log_from_file() {
        return Ok(());
    }
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({l})} {m}{n}")))
        .target(Target::Stderr)
        .build();
    let log_path = env::temp_dir().join(format!("{}.log", env!("CARGO_PKG_NAME")));

    let window_size = 5;
    let fixed_window_roller = FixedWindowRoller::builder()
        .build(
            &format!("{}.{{}}.log", log_path.to_string_lossy()),
            window_size,
        )?;
    let size_limit = 5 * 1024 * 1024; // 5MB as max log file size to roll
    let size_trigger = SizeTrigger::new(size_limit);
    let compound_policy =
        CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));
    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(&log_path, Box::new(compound_policy))
        .anyhow_at("open log file", &log_path)?;
    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                .build("stderr", Box::new(stderr)),
        )
        .build(
            Root::builder()
                .appender("logfile")
                .appender("stderr")
                .build(LevelFilter::Debug),
        )
        .anyhow()?;
    log4rs::init_config(config).anyhow()?;
    Ok(())
}

fn main() {
    if let Err(e) = init_log() {
        eprintln!("failed to initialise logging: {:#}", e);
        process::exit(1);
    }

    let result = config::load_config().and_then(|config| export::run(&config));
    match result {
        Ok(summary) => debug!(
            "{} png(s), {}, {}",
            summary.pngs.len(),
            summary.ico.display(),
            summary.icns.display()
        ),
        Err(e) => {
            error!("{:#}", e);
            process::exit(exit_code(&e));
        }
    }
}

/// -1 when the source image is missing, 1 for every other failure.
fn exit_code(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<SourceNotFound>().is_some() {
        -1
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::PathBuf};

    #[test]
    fn broken_log_config_is_ignored() {
        let dir = env::temp_dir().join(format!("icon-export-log4rs-{}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        let broken = dir.join("log4rs.toml");
        fs::write(&broken, "[appenders.stderr\nkind = ").unwrap();
        assert!(read_log_config(&broken).is_none());

        let valid = dir.join("log4rs.yaml");
        fs::write(
            &valid,
            "appenders:\n  stderr:\n    kind: console\nroot:\n  level: info\n  appenders: [stderr]\n",
        )
        .unwrap();
        assert!(read_log_config(&valid).is_some());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_source_exits_with_minus_one() {
        let e = anyhow::Error::from(SourceNotFound(PathBuf::from("clip.png")));
        assert_eq!(exit_code(&e), -1);
        assert_eq!(exit_code(&e.context("exporting icons")), -1);
    }

    #[test]
    fn other_failures_exit_with_one() {
        assert_eq!(exit_code(&anyhow::anyhow!("icns entry `icon` was not exported")), 1);
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(exit_code(&anyhow::Error::from(io)), 1);
    }
}
