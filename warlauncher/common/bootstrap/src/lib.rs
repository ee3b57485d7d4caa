// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The run-time half of warlauncher: unpacks a repackaged archive into a
//! scratch directory, locates the application's entry point and runs it,
//! and removes the scratch directory however the process ends.

pub mod cleanup;
mod launcher;
mod process;
mod resolver;

pub use crate::launcher::*;
pub use crate::process::*;
pub use crate::resolver::*;
