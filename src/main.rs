use clap::{Arg, Command};
use formgate::config::Config;
use formgate::handler::FormHandler;
use formgate::submission::{RawSubmission, RequestMeta};
use formgate::{logging, server, CheckResult};
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("formgate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Contact-form backend with spam screening and templated mail delivery")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML, or YAML by extension)")
                .default_value("formgate.toml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate an example configuration file"),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and show which template each form uses")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-submission")
                .long("test-submission")
                .value_name("FILE")
                .help("Run the spam checks on a URL-encoded form body without sending mail")
                .requires("form"),
        )
        .arg(
            Arg::new("form")
                .long("form")
                .value_name("ID")
                .help("Form identifier used with --test-submission"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("formgate.toml");
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(matches.get_flag("verbose"), &config.logging) {
        eprintln!("Error opening log file: {e}");
        process::exit(1);
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if let Some(body_file) = matches.get_one::<String>("test-submission") {
        let form_id = matches
            .get_one::<String>("form")
            .map(String::as_str)
            .unwrap_or_default();
        test_submission(&config, body_file, form_id).await;
        return;
    }

    log::info!("Starting formgate v{}...", env!("CARGO_PKG_VERSION"));
    if let Err(e) = server::serve(&config).await {
        log::error!("Server error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::load(path)
    } else {
        eprintln!("Configuration file '{path}' not found, using defaults and environment");
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }
}

fn generate_default_config(path: &str) {
    match Config::example().to_file(path) {
        Ok(()) => {
            println!("Example configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();

    let handler = match FormHandler::from_config(config) {
        Ok(handler) => handler,
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e:#}");
            process::exit(1);
        }
    };

    println!("Listen address: {}:{}", config.global.host, config.global.port);
    println!("SMTP relay: {}:{} ({:?})", config.smtp.host, config.smtp.port, config.smtp.tls);
    println!("Global blocklist terms: {}", config.global.blocklist.len());
    println!(
        "Content classifier: {}",
        if config.api.akismet.is_empty() { "disabled" } else { "Akismet" }
    );
    println!("Template directory: {}", config.global.template_dir);
    println!("Number of forms: {}", handler.registry().len());

    let mut failed = false;
    for id in handler.registry().ids() {
        match handler.composer().template_for(id) {
            Ok(template) => println!("  Form {id}: template {}", template.name()),
            Err(e) => {
                println!("  Form {id}: ❌ {e}");
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
    println!("✅ Configuration validated");
}

async fn test_submission(config: &Config, body_file: &str, form_id: &str) {
    println!("🧪 Testing submission {body_file} against form '{form_id}'");
    println!();

    let body = match std::fs::read_to_string(body_file) {
        Ok(body) => body,
        Err(e) => {
            eprintln!("❌ Error reading submission file: {e}");
            process::exit(1);
        }
    };
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body.trim_end().as_bytes())
        .into_owned()
        .collect();
    println!("Fields: {}", pairs.len());

    let handler = match FormHandler::from_config(config) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            process::exit(1);
        }
    };

    let raw = RawSubmission {
        form_id: form_id.to_string(),
        pairs,
        meta: RequestMeta {
            client_ip: "127.0.0.1".to_string(),
            user_agent: format!("formgate/{}", env!("CARGO_PKG_VERSION")),
            referrer: String::new(),
        },
    };

    match handler.screen(raw).await {
        Ok(CheckResult::Pass) => println!("PASS"),
        Ok(CheckResult::Reject(reason)) => println!("REJECT: {reason}"),
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    }
}
