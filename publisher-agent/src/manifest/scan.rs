//! Building a [`FileList`] from a local staged site directory.

use super::model::{FileEntry, FileList, Permission};
use crate::fs::walker::{walk_directory, WalkOptions};
use md5::{Digest, Md5};
use std::collections::HashSet;
use std::io;
use std::path::Path;

/// Scan `root` and build the local-side [`FileList`], classifying every
/// entry's permission from the writeable/cache path lists exactly as the
/// legacy publish manager reads its `writeable.txt`/`cache.txt` files.
///
/// `writeable` and `cache` are flat sets of exact paths relative to `root`
/// (a listed folder does not implicitly cover its descendants); anything
/// not named in either list gets the default read-only permission.
pub fn scan_local_folder(
    root: &Path,
    writeable: &HashSet<String>,
    cache: &HashSet<String>,
) -> io::Result<FileList> {
    let mut list = FileList::new();
    let options = WalkOptions {
        follow_links: false,
        max_depth: None,
        exclude_patterns: vec![],
    };

    // Discover folders first so permission classification is available when
    // classifying files underneath them.
    let mut folder_paths: Vec<String> = Vec::new();
    collect_folders(root, root, &mut folder_paths)?;
    for folder in &folder_paths {
        let permission = classify(folder, writeable, cache);
        list.add_folder(FileEntry::Folder {
            path: folder.clone(),
            permission,
            old: false,
        });
    }

    for file in walk_directory(root, options)? {
        let rel = file.relative_path.to_string_lossy().replace('\\', "/");
        let permission = classify(&rel, writeable, cache);
        let checksum = md5sum_file(&file.path)?;
        list.add_file(FileEntry::File {
            path: rel,
            size: file.size,
            checksum,
            permission,
            old: false,
        });
    }

    Ok(list)
}

fn collect_folders(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push(rel);
            collect_folders(root, &path, out)?;
        }
    }
    Ok(())
}

/// A path is writeable/cache only if it is itself listed - no inheritance
/// from an ancestor folder, matching the flat `writeable_list`/`cache_list`
/// the legacy publish manager reads verbatim.
fn classify(rel_path: &str, writeable: &HashSet<String>, cache: &HashSet<String>) -> Permission {
    if cache.contains(rel_path) {
        Permission::C
    } else if writeable.contains(rel_path) {
        Permission::W
    } else {
        Permission::R
    }
}

/// Stream a file through MD5 in fixed-size chunks rather than reading it
/// whole, so large site assets don't need to be buffered entirely in
/// memory.
pub fn md5sum_file(path: &Path) -> io::Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn classifies_by_exact_path_with_no_inheritance() {
        let mut writeable = HashSet::new();
        writeable.insert("uploads".to_string());
        writeable.insert("uploads/a.png".to_string());
        let mut cache = HashSet::new();
        cache.insert("tmp".to_string());

        assert_eq!(classify("uploads", &writeable, &cache), Permission::W);
        assert_eq!(classify("uploads/a.png", &writeable, &cache), Permission::W);
        // Not listed itself, only its parent folder is - no inheritance.
        assert_eq!(classify("uploads/b.png", &writeable, &cache), Permission::R);
        assert_eq!(classify("tmp", &writeable, &cache), Permission::C);
        assert_eq!(classify("index.html", &writeable, &cache), Permission::R);
    }

    #[test]
    fn scans_local_tree_with_checksums() -> io::Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("index.html"), b"hello")?;
        fs::create_dir(dir.path().join("uploads"))?;
        fs::write(dir.path().join("uploads/a.txt"), b"data")?;

        let mut writeable = HashSet::new();
        writeable.insert("uploads/a.txt".to_string());

        let list = scan_local_folder(dir.path(), &writeable, &HashSet::new())?;
        assert_eq!(list.files.len(), 2);
        assert_eq!(list.folders.len(), 1);
        assert_eq!(
            list.get_file("index.html").unwrap().permission(),
            Permission::R
        );
        assert_eq!(
            list.get_file("uploads/a.txt").unwrap().permission(),
            Permission::W
        );
        Ok(())
    }
}
