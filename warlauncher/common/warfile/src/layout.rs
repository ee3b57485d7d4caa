// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Well-known paths inside a WAR file.

use std::path::Path;

/// The directory holding the metadata header.
pub const META_INF_DIR: &str = "META-INF";

/// The metadata header entry.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Application code, the first entry of the code-loading path.
pub const CLASSES_DIR: &str = "WEB-INF/classes";

/// Library files, appended to the code-loading path in sorted order.
pub const LIB_DIR: &str = "WEB-INF/lib";

/// Reserved directory where repackaging places the bootstrap payload.
pub const BOOTSTRAP_DIR: &str = "META-INF/warboot";

/// The identifier of the bootstrap launcher, written to `Main-Class` of
/// repackaged archives.
pub const BOOTSTRAP_ENTRY_POINT: &str = "warboot";

/// Returns true if `relative_path` belongs to the bootstrap payload.
pub fn is_bootstrap_entry(relative_path: &Path) -> bool {
    relative_path.starts_with(BOOTSTRAP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_entries() {
        assert!(is_bootstrap_entry(Path::new("META-INF/warboot")));
        assert!(is_bootstrap_entry(Path::new("META-INF/warboot/warboot")));
        assert!(!is_bootstrap_entry(Path::new("META-INF/warboot2/x")));
        assert!(!is_bootstrap_entry(Path::new("META-INF/MANIFEST.MF")));
        assert!(!is_bootstrap_entry(Path::new("WEB-INF/classes/warboot")));
    }
}
