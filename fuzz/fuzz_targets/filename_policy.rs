//! Fuzz target for the inbound filename policy
//!
//! Whatever the name and location, an approved name never escapes the
//! cache directory and never resolves for a restricted location.

#![no_main]

use libfuzzer_sys::fuzz_target;
use xfer_core::{ExpectedFiles, check_requested_filename, verify_cache_filename};
use xfer_files::{LocationKind, PathResolver};

fuzz_target!(|input: (&str, u8, bool)| {
    let (name, location, pre_approve) = input;
    let mut expected = ExpectedFiles::new();
    if pre_approve {
        expected.expect(name);
    }

    let location = LocationKind::from_u8(location);
    let Ok(approved) = check_requested_filename(name, location, &mut expected) else {
        return;
    };

    match approved.location {
        LocationKind::Cache => {
            assert!(verify_cache_filename(&approved.name));
            assert!(!approved.name.contains('/') && !approved.name.contains('\\'));
            let resolver = PathResolver::new("/cache", "/tmp");
            let path = resolver
                .expand(LocationKind::Cache, &approved.name)
                .expect("cache names resolve");
            assert_eq!(path.parent(), Some(std::path::Path::new("/cache")));
        }
        LocationKind::None => {
            assert!(pre_approve);
            assert!(expected.is_empty());
        }
        LocationKind::Other(_) => panic!("restricted location approved"),
    }
});
