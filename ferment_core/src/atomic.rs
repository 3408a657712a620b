use std::{fs, io::Write, path::Path};

/// Replace `path` with `bytes` through a sibling temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Copy `src` into `dest` atomically.
pub fn copy_atomic(src: &Path, dest: &Path) -> std::io::Result<()> {
    let bytes = fs::read(src)?;
    write_atomic(dest, &bytes)
}
