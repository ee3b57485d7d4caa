// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    ffi::{OsStr, OsString},
    sync::{Mutex, MutexGuard},
};

use once_cell::sync::OnceCell;

static MUTEX: OnceCell<Mutex<()>> = OnceCell::new();

/// Overrides environment variables while preventing multiple tests from
/// touching the environment in parallel.
///
/// On dropping the returned object, the variables are reset to their original
/// values and the lock is released.
pub struct EnvVarLock<'a> {
    _lock: MutexGuard<'a, ()>,
    original_values: Vec<(OsString, Option<OsString>)>,
}

impl EnvVarLock<'_> {
    /// Acquires the lock and applies `vars`. A `None` value unsets the
    /// variable.
    pub fn acquire<K, V>(vars: &[(K, Option<V>)]) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let lock = MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut original_values = Vec::new();
        for (key, value) in vars {
            let key = key.as_ref();
            original_values.push((key.to_os_string(), std::env::var_os(key)));
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }

        Self {
            _lock: lock,
            original_values,
        }
    }
}

impl Drop for EnvVarLock<'_> {
    fn drop(&mut self) {
        for (key, value) in self.original_values.iter().rev() {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}
