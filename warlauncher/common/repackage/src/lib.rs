// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The build-time half of warlauncher: turns a WAR file into an archive that
//! `warboot` can run.

mod config;
mod payload;
mod repackager;

pub use crate::config::*;
pub use crate::payload::*;
pub use crate::repackager::*;
