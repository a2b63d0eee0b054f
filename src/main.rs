use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use morph_cli::config::{
	CONFIG_FILE_NAME, LoadedConfig, MergedConfig, RuleConfig, build_morph, discover_configs,
	generate_init_template, load_config_file, load_merged_config, merge_configs,
	parse_config_file, user_config_path,
};
use morph_cli::morph::ELSE_NAME;
use morph_cli::records::{decode_line, encode_record};
use morph_cli::tries::TextReplacer;

#[derive(Parser)]
#[command(name = "morph")]
#[command(
	author,
	version,
	about = "Rule-driven transformation of record streams"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Use this rule file instead of discovering .morph.toml files
	#[arg(long, global = true, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Create a template .morph.toml in the current directory
	#[arg(long)]
	init: bool,

	/// Overwrite existing .morph.toml when using --init
	#[arg(long, requires = "init")]
	force: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Transform JSON lines records (one object per line)
	Run {
		/// Input file; reads stdin when omitted
		input: Option<PathBuf>,
	},
	/// Apply the literal replacements of a configured map
	Replace {
		/// Name of the map holding `search = "replacement"` pairs
		#[arg(long)]
		map: String,

		/// Texts to rewrite; reads stdin lines when omitted
		text: Vec<String>,
	},
	/// List the rules whose source pattern matches a path
	Match {
		/// Literal path, e.g. `245.a`
		path: String,
	},
	/// Configuration management commands
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(Subcommand)]
enum ConfigAction {
	/// Display configuration files and their rules in cascade order
	Show,
	/// Check all config files for errors without running anything
	Validate,
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

	match run() {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<ExitCode> {
	let cli = Cli::parse();

	if cli.init {
		return handle_init(cli.force);
	}

	let config = cli.config.as_deref();
	match cli.command {
		Some(Commands::Run { input }) => handle_run(config, input.as_deref()),
		Some(Commands::Replace { map, text }) => handle_replace(config, &map, &text),
		Some(Commands::Match { path }) => handle_match(config, &path),
		Some(Commands::Config { action }) => match action {
			ConfigAction::Show => handle_config_show(config),
			ConfigAction::Validate => handle_config_validate(config),
		},
		// Unreachable with arg_required_else_help, except for a bare --config
		None => Ok(ExitCode::SUCCESS),
	}
}

fn load_config(explicit: Option<&Path>) -> Result<MergedConfig> {
	match explicit {
		Some(path) => load_config_file(path)
			.with_context(|| format!("Failed to load configuration from {}", path.display())),
		None => {
			let cwd = std::env::current_dir().context("Failed to get current directory")?;
			load_merged_config(&cwd).context("Failed to load configuration")
		}
	}
}

fn handle_init(force: bool) -> Result<ExitCode> {
	let config_path = PathBuf::from(CONFIG_FILE_NAME);

	if config_path.exists() && !force {
		anyhow::bail!("{CONFIG_FILE_NAME} already exists. Use --force to overwrite.");
	}

	std::fs::write(&config_path, generate_init_template())
		.with_context(|| format!("Failed to write {}", config_path.display()))?;

	println!("Created {CONFIG_FILE_NAME}");
	Ok(ExitCode::SUCCESS)
}

fn handle_run(config: Option<&Path>, input: Option<&Path>) -> Result<ExitCode> {
	let config = load_config(config)?;
	let mut morph = build_morph(&config).context("Failed to build rules")?;

	let reader: Box<dyn BufRead> = match input {
		Some(path) => Box::new(BufReader::new(
			std::fs::File::open(path)
				.with_context(|| format!("Failed to open {}", path.display()))?,
		)),
		None => Box::new(std::io::stdin().lock()),
	};
	let mut out = BufWriter::new(std::io::stdout().lock());

	let mut count = 0usize;
	for (index, line) in reader.lines().enumerate() {
		let line_number = index + 1;
		let line = line.with_context(|| format!("Failed to read line {line_number}"))?;
		if line.trim().is_empty() {
			continue;
		}

		for event in decode_line(&line, line_number)? {
			let record = morph
				.feed(event)
				.with_context(|| format!("Failed to transform record on line {line_number}"))?;
			if let Some(record) = record {
				serde_json::to_writer(&mut out, &encode_record(&record))?;
				writeln!(out)?;
				count += 1;
			}
		}
	}
	out.flush()?;

	log::info!("transformed {count} records");
	Ok(ExitCode::SUCCESS)
}

fn handle_replace(config: Option<&Path>, map: &str, text: &[String]) -> Result<ExitCode> {
	let config = load_config(config)?;
	let table = config
		.maps
		.get(map)
		.ok_or_else(|| anyhow::anyhow!("Unknown map: {map}"))?;
	let replacer = TextReplacer::from_pairs(table)
		.with_context(|| format!("Invalid replacement map: {map}"))?;

	if !text.is_empty() {
		for line in text {
			println!("{}", replacer.replace(line));
		}
		return Ok(ExitCode::SUCCESS);
	}

	let mut out = BufWriter::new(std::io::stdout().lock());
	for line in std::io::stdin().lock().lines() {
		let line = line.context("Failed to read stdin")?;
		writeln!(out, "{}", replacer.replace(&line))?;
	}
	out.flush()?;
	Ok(ExitCode::SUCCESS)
}

fn handle_match(config: Option<&Path>, path: &str) -> Result<ExitCode> {
	let config = load_config(config)?;
	let morph = build_morph(&config).context("Failed to build rules")?;

	let rules = morph.matching_rules(path);
	if rules.is_empty() {
		match morph.else_rule() {
			Some(rule) => println!("{path}: no rule matches, falls back to {ELSE_NAME} (node {rule})"),
			None => println!("{path}: no rule matches"),
		}
		return Ok(ExitCode::FAILURE);
	}

	for rule in rules {
		let node = morph.graph().node(rule)?;
		println!("{path}: node {rule} ({})", node.label());
	}
	Ok(ExitCode::SUCCESS)
}

fn handle_config_show(explicit: Option<&Path>) -> Result<ExitCode> {
	let configs = match explicit {
		Some(path) => {
			let config = parse_config_file(path)
				.with_context(|| format!("Failed to load {}", path.display()))?;
			vec![LoadedConfig {
				config,
				path: path.to_path_buf(),
			}]
		}
		None => {
			let cwd = std::env::current_dir().context("Failed to get current directory")?;
			discover_configs(&cwd).context("Failed to discover config files")?
		}
	};

	if configs.is_empty() {
		println!("No configuration files found.");
		return Ok(ExitCode::SUCCESS);
	}

	println!("Configuration files (in cascade order):\n");

	for loaded in &configs {
		println!("# Source: {}", loaded.path.display());
		println!("# root: {}", loaded.config.root);
		if let Some(ref env_var) = loaded.config.root_config_lookup_disable_env_var {
			println!("# root-config-lookup-disable-env-var: {}", env_var);
		}
		if let Some(ref marker) = loaded.config.entity_marker {
			println!("# entity-marker: {}", marker);
		}
		for (name, table) in &loaded.config.maps {
			println!("# map {}: {} entries", name, table.len());
		}
		println!("# rules: {}", loaded.config.rules.len());
		println!();

		for (i, rule) in loaded.config.rules.iter().enumerate() {
			println!("  Rule {}:", i + 1);
			print_rule(rule, 2);
			println!();
		}
	}

	if let Ok(user_path) = user_config_path() {
		println!("User config path: {}", user_path.display());
		if user_path.exists() {
			println!("  (exists)");
		} else {
			println!("  (not found)");
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn print_rule(rule: &RuleConfig, depth: usize) {
	let indent = "  ".repeat(depth);
	if let Some(ref source) = rule.source {
		println!("{indent}source: {}", source);
	}
	if let Some(kind) = rule.collect {
		println!("{indent}collect: {}", kind.as_str());
	}
	if let Some(ref name) = rule.name {
		println!("{indent}name: {}", name);
	}
	if let Some(ref value) = rule.value {
		println!("{indent}value: {}", value);
	}
	if let Some(ref flush_with) = rule.flush_with {
		println!("{indent}flush-with: {}", flush_with);
	}
	if !rule.functions.is_empty() {
		println!("{indent}functions: {}", rule.functions.len());
	}
	if !rule.postprocess.is_empty() {
		println!("{indent}postprocess: {}", rule.postprocess.len());
	}
	for data in &rule.data {
		println!("{indent}data:");
		print_rule(data, depth + 1);
	}
	if let Some(ref condition) = rule.condition {
		println!("{indent}if:");
		print_rule(condition, depth + 1);
	}
}

fn handle_config_validate(explicit: Option<&Path>) -> Result<ExitCode> {
	let configs = match explicit {
		Some(path) => load_config_file(path).map(|merged| (vec![path.to_path_buf()], merged)),
		None => {
			let cwd = std::env::current_dir().context("Failed to get current directory")?;
			discover_configs(&cwd).map(|configs| {
				let paths = configs.iter().map(|c| c.path.clone()).collect();
				(paths, merge_configs(&configs))
			})
		}
	};

	let (paths, merged) = match configs {
		Ok(loaded) => loaded,
		Err(e) => {
			eprintln!("Configuration error: {}", e);
			return Ok(ExitCode::FAILURE);
		}
	};

	if paths.is_empty() {
		println!("No configuration files found.");
		return Ok(ExitCode::SUCCESS);
	}

	match build_morph(&merged) {
		Ok(morph) => {
			println!("All configuration files are valid:");
			for path in &paths {
				println!("  {}", path.display());
			}
			println!(
				"{} rules, {} rule nodes",
				merged.rules.len(),
				morph.graph().len()
			);
			Ok(ExitCode::SUCCESS)
		}
		Err(e) => {
			eprintln!("Configuration error: {}", e);
			Ok(ExitCode::FAILURE)
		}
	}
}
