use clap::{CommandFactory, Parser};

use portal_deploy::ErrorCode;

mod commands;
mod output;

use commands::deploy;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "deploy")]
#[command(version = VERSION)]
#[command(about = "Build the buyer portal and publish it to a versioned WebDAV directory")]
struct Cli {
    #[command(flatten)]
    args: deploy::DeployArgs,
}

fn print_usage() {
    let mut cmd = Cli::command();
    eprintln!("\n{}", cmd.render_usage());
    eprintln!("  --target <name>  Deploy to the named store from deploy.json");
    eprintln!("  --sandbox        Same as --target sandbox");
    eprintln!("  --production     Same as --target production");
    eprintln!("  --dev            Build only (dry run, no upload)\n");
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if cli.args.target_name().is_none() {
        print_usage();
        return std::process::ExitCode::from(2);
    }

    let result = deploy::run(&cli.args);
    let exit_code = match &result {
        Ok((_, code)) => *code,
        Err(err) => output::exit_code_for_error(err.code),
    };

    if let Err(err) = &result {
        if err.code == ErrorCode::TargetNotFound {
            print_usage();
        }
    }

    if cli.args.json {
        let printed = output::print_result(&result.map(|(outcome, _)| outcome));
        if let Err(err) = printed {
            output::print_error_text(&err);
            return std::process::ExitCode::from(1);
        }
    } else {
        match &result {
            Ok((outcome, _)) => print_outcome(outcome),
            Err(err) => output::print_error_text(err),
        }
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn print_outcome(outcome: &portal_deploy::deploy::DeployOutcome) {
    eprintln!("[deploy] Finished");
    if outcome.dry_run {
        println!("\nBuild complete (dry run, nothing uploaded).");
        return;
    }

    if let Some(instructions) = &outcome.instructions {
        println!("{}", instructions);
    }
    println!("Deployed to {}: {}", outcome.target, outcome.absolute_path);
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
