//! Centralized logging configuration for the emulator cores.
//!
//! The cores log sparse events only (cartridge loads, unsupported mapper
//! fallbacks, writes to stubbed registers), so the configuration is a
//! handful of atomics consulted before any formatting happens.
//!
//! # Usage
//!
//! ```rust
//! use lockstep_core::logging::{log, LogCategory, LogLevel};
//!
//! // Lazy evaluation: the closure never runs when the category is off.
//! log(LogCategory::Bus, LogLevel::Info, || {
//!     format!("loaded cartridge, mapper {}", 4)
//! });
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Log level for controlling verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a log level from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category, one per emulator component class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// CPU execution (illegal opcodes, simulated exceptions)
    Cpu,
    /// Bus/memory access and cartridge loading
    Bus,
    /// Video processors (register writes, rendering)
    Video,
    /// Audio processors
    Audio,
    /// Interrupt delivery
    Interrupts,
    /// Unimplemented features/stubs
    Stubs,
}

const CATEGORY_COUNT: usize = 6;

impl LogCategory {
    fn index(self) -> usize {
        match self {
            LogCategory::Cpu => 0,
            LogCategory::Bus => 1,
            LogCategory::Video => 2,
            LogCategory::Audio => 3,
            LogCategory::Interrupts => 4,
            LogCategory::Stubs => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            LogCategory::Cpu => "CPU",
            LogCategory::Bus => "BUS",
            LogCategory::Video => "VIDEO",
            LogCategory::Audio => "AUDIO",
            LogCategory::Interrupts => "INT",
            LogCategory::Stubs => "STUB",
        }
    }
}

/// Global logging configuration backed by atomics so any thread (one per
/// system instance, typically many) can consult it without locking.
pub struct LogConfig {
    levels: [AtomicU8; CATEGORY_COUNT],
}

static CONFIG: LogConfig = LogConfig {
    levels: [
        AtomicU8::new(LogLevel::Off as u8),
        AtomicU8::new(LogLevel::Off as u8),
        AtomicU8::new(LogLevel::Off as u8),
        AtomicU8::new(LogLevel::Off as u8),
        AtomicU8::new(LogLevel::Off as u8),
        AtomicU8::new(LogLevel::Off as u8),
    ],
};

impl LogConfig {
    /// The process-wide configuration.
    pub fn global() -> &'static LogConfig {
        &CONFIG
    }

    /// Set the maximum level for one category.
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    /// Set the maximum level for every category.
    pub fn set_all(&self, level: LogLevel) {
        for slot in &self.levels {
            slot.store(level as u8, Ordering::Relaxed);
        }
    }

    /// Current level for a category.
    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// Whether a message at `level` in `category` would be emitted.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level(category)
    }
}

/// Log a message with lazy formatting. The closure is only invoked when
/// the category/level combination is enabled.
pub fn log<F: FnOnce() -> String>(category: LogCategory, level: LogLevel, message: F) {
    if LogConfig::global().should_log(category, level) {
        eprintln!("[{:5}] {}", category.name(), message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_off() {
        // Fresh categories default to Off; nothing should pass the gate.
        assert!(!LogConfig::global().should_log(LogCategory::Stubs, LogLevel::Error));
    }

    #[test]
    fn level_parsing() {
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("bogus"), None);
    }

    #[test]
    fn level_ordering_gates_messages() {
        let cfg = LogConfig::global();
        cfg.set_level(LogCategory::Cpu, LogLevel::Warn);
        assert!(cfg.should_log(LogCategory::Cpu, LogLevel::Error));
        assert!(cfg.should_log(LogCategory::Cpu, LogLevel::Warn));
        assert!(!cfg.should_log(LogCategory::Cpu, LogLevel::Info));
        cfg.set_level(LogCategory::Cpu, LogLevel::Off);
    }
}
