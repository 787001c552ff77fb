//! Function group file writer
//!
//! Writes `scorep.fgp` into the backend's experiment directory: one function
//! group per loaded module, each matching every region whose name starts with
//! the module. The file is consumed by downstream matching tools, not by this
//! crate.
//!
//! Modules are written in reverse lexicographic order so the same module set
//! always produces the same bytes.

use log::{debug, info};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::domain::FlushError;
use crate::registry::ModuleRegistry;

/// Name of the filter file inside the experiment directory
pub const FILE_NAME: &str = "scorep.fgp";

const OPTIONS_HEADER: &str = "\
BEGIN OPTIONS
        MATCHING_STRATEGY=FIRST
        CASE_SENSITIVITY_FUNCTION_NAME=NO
        CASE_SENSITIVITY_MANGLED_NAME=NO
        CASE_SENSITIVITY_SOURCE_FILE_NAME=NO
END OPTIONS

";

/// Sort modules into file order
#[must_use]
pub fn ordered(modules: &[String]) -> Vec<&str> {
    let mut sorted: Vec<&str> = modules.iter().map(String::as_str).collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
}

/// Write the header and one group per module
pub fn write_groups<W: Write>(mut writer: W, modules: &[String]) -> io::Result<()> {
    writer.write_all(OPTIONS_HEADER.as_bytes())?;
    for module in ordered(modules) {
        writeln!(writer, "BEGIN FUNCTION_GROUP {module}")?;
        writeln!(writer, "\tNAME={module}*")?;
        writeln!(writer, "END FUNCTION_GROUP")?;
    }
    Ok(())
}

/// Render the whole file into a string
#[must_use]
pub fn render(modules: &[String]) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_groups(&mut out, modules);
    String::from_utf8_lossy(&out).into_owned()
}

/// Create (or truncate) `<dir>/scorep.fgp` and write the groups
pub fn write_file(dir: &Path, modules: &[String]) -> Result<PathBuf, FlushError> {
    let path = dir.join(FILE_NAME);
    let write = || -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&path)?);
        write_groups(&mut writer, modules)?;
        writer.flush()
    };
    write().map_err(|source| FlushError::Write { path: path.clone(), source })?;
    Ok(path)
}

/// Snapshot the registry and write the file into the experiment directory
///
/// Returns `Ok(None)` on MPI ranks other than 0, which leave the shared file
/// to rank 0.
pub fn flush(backend: &dyn Backend, registry: &ModuleRegistry) -> Result<Option<PathBuf>, FlushError> {
    if let Some(rank) = backend.rank().filter(|&rank| rank != 0) {
        debug!("rank {rank}: function group file left to rank 0");
        return Ok(None);
    }

    let dir = backend.experiment_dir_name().map_err(FlushError::ExperimentDir)?;
    let modules = registry.snapshot();
    let path = write_file(&dir, &modules)?;
    info!("wrote {} function groups to {}", modules.len(), path.display());
    Ok(Some(path))
}
