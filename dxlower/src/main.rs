use clap::{Parser, Subcommand};
use dxlower_core::{ShaderModel, ShaderStage};
use log::debug;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "dxlower")]
#[command(about = "Shader model tooling for the DXIL lowering backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a target triple into a shader profile (e.g. cs_6_7)
    Triple {
        /// Target triple, e.g. dxil-unknown-shadermodel6.7-compute
        #[arg(value_name = "TRIPLE")]
        triple: String,
    },

    /// Encode a shader profile into its canonical target triple
    Profile {
        /// Profile in dxc form, e.g. cs_6_7
        #[arg(value_name = "PROFILE")]
        profile: String,
    },
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("Compilation error: {0}")]
    CompilationError(#[from] dxlower_core::CompilerError),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),
}

/// Parse a dxc-style profile string `<stage>_<major>_<minor>`, where the
/// minor component may be the experimental marker `x`.
fn parse_profile(profile: &str) -> Result<ShaderModel, DriverError> {
    let invalid = || DriverError::InvalidProfile(profile.to_string());

    let mut parts = profile.splitn(3, '_');
    let stage = parts
        .next()
        .and_then(|s| ShaderStage::from_short_name(s).ok())
        .ok_or_else(invalid)?;
    let major = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(invalid)?;
    let minor = match parts.next().ok_or_else(invalid)? {
        "x" => 0xF,
        s => s.parse::<u32>().map_err(|_| invalid())?,
    };

    Ok(ShaderModel::new(stage, major, minor))
}

fn main() -> Result<(), DriverError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Triple { triple } => {
            // Reuse the module decoder so the CLI and the passes agree on
            // every edge case.
            let m = dxlower_core::ir::Module::new(triple);
            let sm = ShaderModel::from_triple(&m)?;
            debug!("decoded shader model {:?}", sm);
            if sm.is_empty() {
                println!("(no shader model)");
            } else {
                println!("{}", sm);
            }
        }
        Commands::Profile { profile } => {
            let sm = parse_profile(&profile)?;
            println!("{}", sm.triple_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parsing() {
        let sm = parse_profile("cs_6_7").unwrap();
        assert_eq!(sm, ShaderModel::new(ShaderStage::Compute, 6, 7));
        assert_eq!(sm.triple_string(), "dxil-unknown-shadermodel6.7-compute");

        let sm = parse_profile("ps_6_x").unwrap();
        assert_eq!(sm.minor, 0xF);

        assert!(parse_profile("kernel_6_0").is_err());
        assert!(parse_profile("cs_6").is_err());
        assert!(parse_profile("cs_six_0").is_err());
    }
}
