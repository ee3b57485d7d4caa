// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reads and writes web application archives (WAR files).
//!
//! A WAR file is a zip archive with the following conventional layout:
//!
//! ```text
//! META-INF/MANIFEST.MF    metadata header (see [`Manifest`])
//! WEB-INF/classes/...     application code
//! WEB-INF/lib/...         library files
//! ```

mod error;
mod extract;
pub mod layout;
mod manifest;
mod pack;

pub use crate::error::*;
pub use crate::extract::*;
pub use crate::manifest::*;
pub use crate::pack::*;
