// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod depth;
mod logging;
mod prefs;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use depth::ChainDepthEngine;
use prefs::FilePreferences;
use runtime::DataRuntime;
use std::cell::RefCell;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;
use tabgrid_app::AppState;
use tabgrid_engine::EngineBuilder;
use tabgrid_tui::{AppRuntime, TerminalHost};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tabgrid --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let mut runtime = match (&options.data_path, options.demo) {
        (Some(path), _) => DataRuntime::from_file(path),
        (None, true) => DataRuntime::demo(),
        (None, false) => bail!("nothing to show; pass --data <file> or --demo"),
    };
    let tabs = runtime.profile_keys().context("list profiles")?;
    if tabs.is_empty() {
        bail!("no profiles to show; the data file lists none");
    }

    let preferences_path = config.preferences_path()?;
    let preferences = FilePreferences::open(&preferences_path).with_context(|| {
        format!(
            "open preferences {} -- if this path is wrong, set [storage].preferences_path",
            preferences_path.display()
        )
    })?;
    let engine_config = config.engine_config()?;
    if options.check_only {
        return Ok(());
    }

    let log_path = logging::init(config.log_level(), &config.log_path()?)?;
    tracing::info!(
        config = %options.config_path.display(),
        log = %log_path.display(),
        preferences = %preferences.path().display(),
        profiles = tabs.len(),
        "starting tabgrid"
    );

    let host = TerminalHost::shared();
    let engine = EngineBuilder::new(host.clone(), host.clone())
        .config(engine_config)
        .preferences(Rc::new(RefCell::new(preferences)))
        .depth_engine(Rc::new(ChainDepthEngine))
        .build();

    let mut state = AppState::with_tabs(tabs);
    tabgrid_tui::run_app(&mut state, &mut runtime, &engine, &host)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    data_path: Option<PathBuf>,
    print_config_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        data_path: None,
        print_config_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--data" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--data requires a file path"))?;
                options.data_path = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    if options.demo && options.data_path.is_some() {
        bail!("--demo and --data are mutually exclusive");
    }

    Ok(options)
}

fn print_help() {
    println!("tabgrid");
    println!("  --config <path>          Use a specific config path");
    println!("  --data <path>            Load profiles from a JSON data file");
    println!("  --demo                   Launch with generated demo profiles");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config, data and preferences, then exit");
    println!("  --help                   Show this help");
}
