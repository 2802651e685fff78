//! Property-based tests for the archive round trip.
//!
//! These tests use proptest to generate random directory trees and verify that
//! packing and unpacking them reproduces every file exactly.

#[cfg(test)]
mod proptest_tests {
    use crate::archive::{pack, unpack};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    /// A generated file: (directory slot, content, mode). Slot 0 is the tree root.
    fn file_strategy() -> impl Strategy<Value = (u8, Vec<u8>, u32)> {
        (
            0u8..4,
            prop::collection::vec(any::<u8>(), 0..256),
            prop::sample::select(vec![0o400, 0o444, 0o600, 0o640, 0o644, 0o664, 0o700, 0o755]),
        )
    }

    fn build_tree(root: &Path, files: &[(u8, Vec<u8>, u32)]) -> BTreeMap<String, (Vec<u8>, u32)> {
        let mut expected = BTreeMap::new();
        for (index, (slot, content, mode)) in files.iter().enumerate() {
            let relative = if *slot == 0 {
                format!("file-{}", index)
            } else {
                format!("dir-{}/nested/file-{}", slot, index)
            };
            let path = root.join(&relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(*mode)).unwrap();
            expected.insert(relative, (content.clone(), *mode));
        }
        expected
    }

    fn collect_tree(root: &Path) -> BTreeMap<String, (Vec<u8>, u32)> {
        let mut found = BTreeMap::new();
        for entry in walkdir::WalkDir::new(root).min_depth(1) {
            let entry = entry.unwrap();
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let content = fs::read(entry.path()).unwrap();
            let mode = entry.metadata().unwrap().permissions().mode() & 0o777;
            found.insert(relative, (content, mode));
        }
        found
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: unpack(pack(T)) reproduces paths, contents and file modes
        #[test]
        fn pack_then_unpack_reproduces_tree(files in prop::collection::vec(file_strategy(), 0..12)) {
            let source = TempDir::new().unwrap();
            let expected = build_tree(source.path(), &files);

            let scratch = TempDir::new().unwrap();
            let archive = scratch.path().join("tile.pivotal");
            let dest = scratch.path().join("extracted");

            pack(source.path(), &archive).unwrap();
            unpack(&archive, &dest).unwrap();

            prop_assert_eq!(collect_tree(&dest), expected);
        }

        /// Property: packing the same tree twice yields the same entry order
        #[test]
        fn pack_entry_order_is_deterministic(files in prop::collection::vec(file_strategy(), 1..8)) {
            let source = TempDir::new().unwrap();
            build_tree(source.path(), &files);

            let scratch = TempDir::new().unwrap();
            let first = scratch.path().join("first.pivotal");
            let second = scratch.path().join("second.pivotal");
            pack(source.path(), &first).unwrap();
            pack(source.path(), &second).unwrap();

            let names = |path: &Path| {
                let archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
                archive.file_names().map(str::to_string).collect::<Vec<_>>()
            };
            prop_assert_eq!(names(&first), names(&second));
        }
    }
}
