// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::LoggingConfig;

/// Settings applied by [`crate::cli_main`] before running the program.
pub struct Config {
    pub(crate) logging: LoggingConfig,
    pub(crate) log_command_line: bool,
    /// Why the logging environment was ignored, reported once logging is up.
    pub(crate) logging_error: Option<anyhow::Error>,
}

impl Config {
    /// Reads the logging settings from the environment. If they are
    /// inconsistent, logs go to the console only and the problem is reported
    /// as a warning instead of failing the program.
    pub fn from_env() -> Self {
        let (logging, logging_error) = match LoggingConfig::from_env() {
            Ok(logging) => (logging, None),
            Err(e) => (LoggingConfig::console_only(), Some(e)),
        };
        Self {
            logging,
            log_command_line: true,
            logging_error,
        }
    }

    /// Replaces the logging settings read from the environment.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self.logging_error = None;
        self
    }

    /// Controls whether the command line of the process is logged at startup.
    pub fn log_command_line(mut self, enable: bool) -> Self {
        self.log_command_line = enable;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
