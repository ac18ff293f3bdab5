//! Biblioteca de programas con nombre.
//!
//! Descubre tablas `*.csv` en un directorio (id = nombre de fichero sin
//! extensión) y compila bajo demanda para cada escala a través de un único
//! `ProgramCompiler` compartido. Si hay `build_dir`, cada compilación nueva
//! se persiste allí.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::compiled::CompiledProgram;
use super::compiler::{ProgramCompiler, ProgramSource};
use crate::constants::DEFAULT_PROGRAM_VERSION;
use crate::errors::CoreError;

#[derive(Debug)]
pub struct ProgramLibrary {
    programs: BTreeMap<String, ProgramSource>,
    compiler: ProgramCompiler,
    version: String,
    build_dir: Option<PathBuf>,
}

impl Default for ProgramLibrary {
    fn default() -> Self { Self::new() }
}

impl ProgramLibrary {
    pub fn new() -> Self {
        Self { programs: BTreeMap::new(),
               compiler: ProgramCompiler::new(),
               version: DEFAULT_PROGRAM_VERSION.to_string(),
               build_dir: None }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = Some(dir.into());
        self
    }

    /// Carga todas las tablas `*.csv` de `dir`.
    pub fn discover(dir: &Path) -> Result<Self, CoreError> {
        let mut library = Self::new();
        if !dir.is_dir() {
            warn!("program directory not found: {}", dir.display());
            return Ok(library);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?.filter_map(|e| e.ok().map(|e| e.path()))
                                                        .filter(|p| p.extension().is_some_and(|x| x.eq_ignore_ascii_case("csv")))
                                                        .collect();
        paths.sort();
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let text = fs::read_to_string(&path)?;
            library.programs.insert(stem.to_string(),
                                    ProgramSource { program_id: stem.to_string(),
                                                    source_file: Some(path.display().to_string()),
                                                    text });
        }
        info!("discovered {} programs: {:?}", library.programs.len(), library.list());
        Ok(library)
    }

    pub fn insert(&mut self, source: ProgramSource) { self.programs.insert(source.program_id.clone(), source); }

    pub fn contains(&self, program_id: &str) -> bool { self.programs.contains_key(program_id) }

    pub fn list(&self) -> Vec<&str> { self.programs.keys().map(String::as_str).collect() }

    pub fn compiler(&self) -> &ProgramCompiler { &self.compiler }

    /// Compila `program_id` a la escala dada (caché incluida).
    pub fn compile_for_scale(&self, program_id: &str, target_scale_mmol: f64) -> Result<Arc<CompiledProgram>, CoreError> {
        let source = self.programs
                         .get(program_id)
                         .ok_or_else(|| CoreError::UnknownProgram(program_id.to_string()))?;
        let before = self.compiler.cached();
        let program = self.compiler.compile(source, target_scale_mmol, &self.version)?;
        if let Some(dir) = &self.build_dir {
            if self.compiler.cached() > before {
                let path = program.persist(dir)?;
                info!("wrote compiled program {}", path.display());
            }
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIX_ONLY: &str = "step_id,group_id,loop_type,loop_times,function_id,volume_per_mmol,time_seconds\n1,1,,,MIX,,60\n";

    #[test]
    fn unknown_program_fails_fast() {
        let lib = ProgramLibrary::new();
        assert_eq!(lib.compile_for_scale("missing", 0.1).unwrap_err(), CoreError::UnknownProgram("missing".into()));
    }

    #[test]
    fn discover_reads_csv_files_and_persists_builds() {
        let src = tempfile::tempdir().unwrap();
        let build = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("mix_only.csv"), MIX_ONLY).unwrap();
        std::fs::write(src.path().join("notes.txt"), "ignored").unwrap();

        let lib = ProgramLibrary::discover(src.path()).unwrap().with_build_dir(build.path());
        assert_eq!(lib.list(), vec!["mix_only"]);

        let p = lib.compile_for_scale("mix_only", 0.5).unwrap();
        let expected = build.path().join(p.file_name());
        assert!(expected.exists());
        assert!(p.file_name().starts_with("mix_only_0p5mmol_"));

        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(expected).unwrap()).unwrap();
        assert_eq!(doc["step_count"], 1);
        assert_eq!(doc["program_id"], "mix_only");
        assert!(doc["compiled_at"].is_string());
    }

    #[test]
    fn missing_directory_yields_empty_library() {
        let lib = ProgramLibrary::discover(Path::new("/definitely/not/here")).unwrap();
        assert!(lib.list().is_empty());
    }
}
