// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod archive;
mod env;
mod tree;

pub use archive::*;
pub use env::*;
pub use tree::*;
