use std::{fs, io::Write, path::Path};

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never observes a half-written table.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
