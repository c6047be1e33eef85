use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::VmError;
use crate::linker::{self, Module, Options};

pub const SOURCE_EXTENSION: &str = "vm";
pub const OUTPUT_EXTENSION: &str = "asm";

/// A resolved compilation unit: where the output goes and which sources feed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub output: PathBuf,
    pub sources: Vec<PathBuf>,
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().map_or(false, |ext| ext == extension)
}

/// Resolves a file or directory into a unit.
///
/// A file `X.vm` compiles to `X.asm` beside it. A directory `D` links every
/// `.vm` file it holds, in file name order, into `D/D.asm`.
pub fn resolve(path: &Path) -> Result<Unit, VmError> {
    if path.is_dir() {
        let read_err = |source: io::Error| VmError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut sources = vec![];
        for entry in fs::read_dir(path).map_err(read_err)? {
            let source = entry.map_err(read_err)?.path();
            if source.is_file() && has_extension(&source, SOURCE_EXTENSION) {
                sources.push(source);
            }
        }
        if sources.is_empty() {
            return Err(VmError::NoSources(path.to_path_buf()));
        }
        sources.sort();

        // canonicalize so that "." and "dir/" still yield a file name
        let mut name = path
            .canonicalize()
            .map_err(read_err)?
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "out".into());
        name.push(".");
        name.push(OUTPUT_EXTENSION);
        let output = path.join(name);

        Ok(Unit { output, sources })
    } else if path.is_file() {
        if has_extension(path, OUTPUT_EXTENSION) {
            return Err(VmError::WouldOverwrite(path.to_path_buf()));
        }
        Ok(Unit {
            output: path.with_extension(OUTPUT_EXTENSION),
            sources: vec![path.to_path_buf()],
        })
    } else {
        Err(VmError::NotFound(path.to_path_buf()))
    }
}

/// Compiles one target and returns the path of the assembly it wrote.
///
/// Every source is read before the output is created, so an unreadable
/// source never truncates an existing output. The output file is closed
/// when this returns, on success or failure.
pub fn compile(path: &Path, options: &Options) -> Result<PathBuf, VmError> {
    let unit = resolve(path)?;
    info!(
        "{} -> {} ({} source(s))",
        path.display(),
        unit.output.display(),
        unit.sources.len()
    );

    let modules = unit
        .sources
        .iter()
        .map(|source| {
            debug!("reading {}", source.display());
            Module::from_path(source)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let write_err = |source: io::Error| VmError::Write {
        path: unit.output.clone(),
        source,
    };
    let mut out = BufWriter::new(File::create(&unit.output).map_err(write_err)?);
    linker::link(&modules, options, &mut out, &unit.output)?;
    out.flush().map_err(write_err)?;

    Ok(unit.output)
}
