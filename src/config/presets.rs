/// Built-in language pipelines
///
/// Each entry is a complete compile/run recipe. Operators can override any
/// of them through the `languages` table of the config file; languages the
/// file leaves out keep these defaults.
use crate::config::types::{Language, ResourceLimits};
use crate::judge::pipeline::{LanguagePipeline, PhaseSpec, BINARY, DEPS, PACKAGES, SOURCE, WORKDIR};
use std::collections::BTreeMap;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn limits(cpu_seconds: u64, address_space: u64) -> ResourceLimits {
    ResourceLimits {
        cpu_seconds,
        max_address_space_bytes: address_space,
        core_dump_bytes: 0,
    }
}

/// Compiler budget: compilation gets more time and memory than a run.
fn compile_limits() -> ResourceLimits {
    limits(20, GIB)
}

fn python() -> LanguagePipeline {
    LanguagePipeline {
        language: Language::Python,
        file_name: "main.py".to_string(),
        compile: None,
        run: PhaseSpec::new(&["python3", "-B", SOURCE], 10_000, limits(5, 512 * MIB))
            .with_env("PYTHONPATH", DEPS)
            .with_env("PYTHONIOENCODING", "utf-8")
            .with_env("PYTHONUNBUFFERED", "1"),
        install: Some(PhaseSpec::new(
            &[
                "python3",
                "-m",
                "pip",
                "install",
                "--disable-pip-version-check",
                "--no-input",
                "--no-cache-dir",
                "--quiet",
                "--target",
                DEPS,
                PACKAGES,
            ],
            120_000,
            limits(60, 2 * GIB),
        )),
        notes: None,
    }
}

fn javascript() -> LanguagePipeline {
    // V8 reserves far more address space than it touches; the heap itself
    // is bounded by --max-old-space-size.
    LanguagePipeline {
        language: Language::Javascript,
        file_name: "main.js".to_string(),
        compile: None,
        run: PhaseSpec::new(
            &["node", "--max-old-space-size=256", SOURCE],
            10_000,
            limits(5, 4 * GIB),
        ),
        install: Some(PhaseSpec::new(
            &[
                "npm",
                "install",
                "--no-audit",
                "--no-fund",
                "--no-save",
                "--silent",
                "--prefix",
                WORKDIR,
                PACKAGES,
            ],
            120_000,
            limits(60, 4 * GIB),
        )),
        notes: None,
    }
}

fn c() -> LanguagePipeline {
    LanguagePipeline {
        language: Language::C,
        file_name: "main.c".to_string(),
        compile: Some(PhaseSpec::new(
            &["gcc", "-std=c17", "-O2", "-pipe", "-o", BINARY, SOURCE, "-lm"],
            30_000,
            compile_limits(),
        )),
        run: PhaseSpec::new(&[BINARY], 10_000, limits(5, 256 * MIB)),
        install: None,
        notes: None,
    }
}

fn cpp() -> LanguagePipeline {
    LanguagePipeline {
        language: Language::Cpp,
        file_name: "main.cpp".to_string(),
        compile: Some(PhaseSpec::new(
            &["g++", "-std=c++17", "-O2", "-pipe", "-o", BINARY, SOURCE],
            30_000,
            compile_limits(),
        )),
        run: PhaseSpec::new(&[BINARY], 10_000, limits(5, 256 * MIB)),
        install: None,
        notes: None,
    }
}

fn java() -> LanguagePipeline {
    LanguagePipeline {
        language: Language::Java,
        file_name: "Main.java".to_string(),
        compile: Some(PhaseSpec::new(
            &["javac", "-J-Xmx512m", "-encoding", "UTF-8", SOURCE],
            45_000,
            limits(30, 4 * GIB),
        )),
        run: PhaseSpec::new(
            &[
                "java",
                "-Xmx256m",
                "-Xss8m",
                "-XX:+UseSerialGC",
                "-Dfile.encoding=UTF-8",
                "-cp",
                WORKDIR,
                "Main",
            ],
            15_000,
            limits(10, 4 * GIB),
        ),
        install: None,
        notes: Some("Java entry point must be `public class Main` with a `main` method".to_string()),
    }
}

fn php() -> LanguagePipeline {
    LanguagePipeline {
        language: Language::Php,
        file_name: "main.php".to_string(),
        compile: None,
        run: PhaseSpec::new(&["php", SOURCE], 10_000, limits(5, 512 * MIB)),
        install: None,
        notes: None,
    }
}

/// Default recipe for one language.
pub fn builtin_pipeline(language: Language) -> LanguagePipeline {
    match language {
        Language::Python => python(),
        Language::Javascript => javascript(),
        Language::C => c(),
        Language::Cpp => cpp(),
        Language::Java => java(),
        Language::Php => php(),
    }
}

/// Default table covering every [`Language`].
pub fn builtin_pipelines() -> BTreeMap<Language, LanguagePipeline> {
    Language::ALL
        .iter()
        .map(|&language| (language, builtin_pipeline(language)))
        .collect()
}
