use crate::config::engine::EngineConfig;
use crate::config::types::Language;
use crate::core::coordinator::Engine;
use crate::core::request::parse_message;
use crate::core::types::{ExecutionReply, ExecutionRequest};
use crate::judge::pipeline::LanguagePipeline;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a snippet
    Exec {
        /// Language identifier; detected from the code when omitted
        #[arg(long)]
        language: Option<String>,
        /// Source code to execute
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,
        /// Read source from a file ("-" for stdin)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Input data to pass to stdin
        #[arg(long)]
        stdin: Option<String>,
        #[arg(long, default_value = "cli")]
        caller: String,
        /// Print output as text instead of JSON
        #[arg(long)]
        plain: bool,
    },
    /// Run a chat-style message: `[language] code` or a fenced block
    Eval {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
        #[arg(long, default_value = "cli")]
        caller: String,
        #[arg(long)]
        plain: bool,
    },
    /// Manage per-caller packages
    Deps {
        #[command(subcommand)]
        action: DepsAction,
    },
    /// Show recent runs
    History {
        #[arg(long, default_value = "cli")]
        caller: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the detected language of a snippet
    Detect {
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List configured languages
    Languages,
    /// Check that every configured toolchain is installed
    CheckDeps {
        /// Show resolved paths for each program
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum DepsAction {
    /// Add packages to the caller's set
    Add {
        #[arg(required = true)]
        packages: Vec<String>,
        #[arg(long, default_value = "cli")]
        caller: String,
    },
    /// List the caller's packages
    List {
        #[arg(long, default_value = "cli")]
        caller: String,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Exec {
            language,
            code,
            file,
            stdin,
            caller,
            plain,
        } => {
            let code = read_source(code, file.as_deref())?;
            let mut request = ExecutionRequest::new(caller, code);
            if let Some(language) = language {
                request = request.with_language(language);
            }
            if let Some(stdin) = stdin {
                request = request.with_stdin(stdin);
            }
            let engine = Engine::new(config)?;
            let reply = engine.execute(&request)?;
            print_reply(&reply, plain)?;
            if !reply.success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Eval {
            text,
            caller,
            plain,
        } => {
            let text = text.join(" ");
            let Some(parsed) = parse_message(&text) else {
                bail!("Nothing to run. Example: snipbox eval python \"print('hi')\"");
            };
            let engine = Engine::new(config)?;
            let reply = engine.execute(&parsed.into_request(caller))?;
            print_reply(&reply, plain)?;
            if !reply.success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Deps { action } => {
            let engine = Engine::new(config)?;
            let packages = match action {
                DepsAction::Add { packages, caller } => engine.add_dependencies(&caller, &packages)?,
                DepsAction::List { caller } => engine.dependencies(&caller),
            };
            println!("{}", serde_json::to_string_pretty(&packages)?);
            Ok(())
        }
        Commands::History { caller, limit } => {
            let engine = Engine::new(config)?;
            let entries = engine.history(&caller, limit)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Commands::Detect { code, file } => {
            let code = read_source(code, file.as_deref())?;
            println!("{}", crate::judge::detect::detect(&code));
            Ok(())
        }
        Commands::Languages => {
            for pipeline in config.effective_pipelines().values() {
                print_language(pipeline);
            }
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_language_dependencies(&config, verbose),
    }
}

fn read_source(code: Option<String>, file: Option<&Path>) -> Result<String> {
    match (code, file) {
        (Some(code), _) => Ok(code),
        (None, Some(path)) if path == Path::new("-") => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("Failed to read source from stdin")?;
            Ok(code)
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file {}", path.display())),
        (None, None) => bail!("Provide --code or --file"),
    }
}

fn print_reply(reply: &ExecutionReply, plain: bool) -> Result<()> {
    if plain {
        println!(
            "Output - {} [{}]",
            reply.language.display_name(),
            reply.status
        );
        println!("{}", reply.render_plain());
    } else {
        println!("{}", serde_json::to_string_pretty(reply)?);
    }
    Ok(())
}

fn print_language(pipeline: &LanguagePipeline) {
    let kind = if pipeline.is_compiled() {
        "compiled"
    } else {
        "interpreted"
    };
    let packages = if pipeline.supports_packages() {
        ", packages"
    } else {
        ""
    };
    println!(
        "{:<11} {:<11} {}{}",
        pipeline.language.id(),
        pipeline.language.display_name(),
        kind,
        packages
    );
    if let Some(notes) = &pipeline.notes {
        println!("            note: {}", notes);
    }
}

/// Locate `program` the way a child would: absolute paths as-is, bare names
/// through the configured search path.
fn find_program(program: &str, search_path: &str) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let is_executable = |path: &Path| {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    };

    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| is_executable(candidate))
}

/// Programs a pipeline launches directly (placeholders excluded).
fn pipeline_programs(pipeline: &LanguagePipeline) -> Vec<&str> {
    let mut programs: Vec<&str> = pipeline
        .phases()
        .filter_map(|phase| phase.command.first())
        .map(String::as_str)
        .filter(|program| !program.starts_with('{'))
        .collect();
    programs.dedup();
    programs
}

fn check_language_dependencies(config: &EngineConfig, verbose: bool) -> Result<()> {
    println!("Checking language dependencies...");
    println!();

    let mut missing_languages: Vec<Language> = Vec::new();

    for pipeline in config.effective_pipelines().values() {
        let mut lang_ok = true;
        let mut details = Vec::new();

        for program in pipeline_programs(pipeline) {
            match find_program(program, &config.search_path) {
                Some(path) => details.push(format!("  {} -> {}", program, path.display())),
                None => {
                    lang_ok = false;
                    details.push(format!("  {} -> NOT FOUND", program));
                }
            }
        }

        let label = pipeline.language.display_name();
        if lang_ok {
            println!("OK      {}", label);
        } else {
            println!("MISSING {}", label);
            missing_languages.push(pipeline.language);
        }
        if verbose {
            for line in details {
                println!("{}", line);
            }
        }
    }

    println!();
    if missing_languages.is_empty() {
        println!("All language toolchains are installed");
        return Ok(());
    }

    let names: Vec<&str> = missing_languages.iter().map(|l| l.display_name()).collect();
    println!("Missing toolchains: {}", names.join(", "));
    println!();
    println!("Install manually:");
    for language in &missing_languages {
        match language {
            Language::Python => println!("  Python: sudo apt install python3 python3-pip"),
            Language::Javascript => println!("  JavaScript: sudo apt install nodejs npm"),
            Language::C | Language::Cpp => println!("  {}: sudo apt install build-essential", language.display_name()),
            Language::Java => println!("  Java: sudo apt install openjdk-17-jdk"),
            Language::Php => println!("  PHP: sudo apt install php-cli"),
        }
    }
    std::process::exit(1);
}
