use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};

use varsel::config::{Config, SignatureHash};
use varsel::crl::{build_crl, CrlConfig, CrlEntry, CrlVersion};
use varsel::index::{IndexFileStore, RevocationStore};
use varsel::ocsp::OCSPIssuer;

fn main() -> Result<()> {
    pretty_env_logger::init();

    match app().get_matches().subcommand() {
        Some(("crl", sub)) => cmd_crl(sub),
        Some(("revoke", sub)) => cmd_revoke(sub),
        Some(("restore", sub)) => cmd_restore(sub),
        Some(("status", sub)) => cmd_status(sub),
        _ => unreachable!("subcommand is required"),
    }
}

fn config_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("config")
                .help("Path to the varsel configuration file")
                .short('c')
                .long("config")
                .value_name("FILE")
                .required(true),
        )
        .arg(
            Arg::new("issuer")
                .help("Index of the issuer to operate on")
                .long("issuer")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
}

fn app() -> Command {
    Command::new("varsel-ctl")
        .version(crate_version!())
        .about("Operational tooling for the varsel OCSP responder")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(config_args(
            Command::new("crl")
                .about("Build and sign a CRL from the CA database")
                .arg(
                    Arg::new("out")
                        .help("Where to write the DER-encoded CRL")
                        .short('o')
                        .long("out")
                        .value_name("FILE")
                        .required(true),
                )
                .arg(
                    Arg::new("number")
                        .help("CRL number")
                        .long("number")
                        .value_name("N")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("days")
                        .help("Days until the next CRL is due")
                        .long("days")
                        .value_name("DAYS")
                        .value_parser(clap::value_parser!(i64))
                        .default_value("30"),
                )
                .arg(
                    Arg::new("hash")
                        .help("Signature hash (sha1 is the legacy default; prefer sha256)")
                        .long("hash")
                        .value_name("HASH")
                        .default_value("sha1"),
                )
                .arg(
                    Arg::new("v1")
                        .help("Emit a v1 CRL without extensions")
                        .long("v1")
                        .action(ArgAction::SetTrue),
                ),
        ))
        .subcommand(config_args(
            Command::new("revoke")
                .about("Mark a certificate revoked in the CA database")
                .arg(Arg::new("serial").help("Serial number in hex").required(true))
                .arg(
                    Arg::new("reason")
                        .help("Revocation reason name, e.g. keyCompromise")
                        .long("reason")
                        .value_name("REASON"),
                ),
        ))
        .subcommand(config_args(
            Command::new("restore")
                .about("Return a revoked certificate to the valid state")
                .arg(Arg::new("serial").help("Serial number in hex").required(true)),
        ))
        .subcommand(config_args(
            Command::new("status")
                .about("Print the CA database's view of a certificate")
                .arg(Arg::new("serial").help("Serial number in hex").required(true)),
        ))
}

fn load_store(sub: &ArgMatches) -> Result<(Config, usize, IndexFileStore)> {
    let config_path = PathBuf::from(sub.get_one::<String>("config").unwrap());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let issuer = *sub.get_one::<usize>("issuer").unwrap();
    let store = IndexFileStore::new(&config.issuer(issuer)?.database);
    Ok((config, issuer, store))
}

fn serial_arg(sub: &ArgMatches) -> String {
    sub.get_one::<String>("serial").unwrap().to_uppercase()
}

fn cmd_crl(sub: &ArgMatches) -> Result<()> {
    let (config, issuer_index, store) = load_store(sub)?;
    let issuer = OCSPIssuer::load(config.issuer(issuer_index)?)?;

    let entries = store.revoked_entries()?
        .iter()
        .map(CrlEntry::from_index)
        .collect::<Vec<_>>();

    let crl_config = CrlConfig {
        number: *sub.get_one::<u64>("number").unwrap(),
        version: if sub.get_flag("v1") { CrlVersion::V1 } else { CrlVersion::V2 },
        days: *sub.get_one::<i64>("days").unwrap(),
        hash: sub.get_one::<String>("hash").unwrap()
            .parse::<SignatureHash>()
            .map_err(|err| anyhow!(err))?,
    };

    let der = build_crl(&issuer.cert, &issuer.pkey, &crl_config, &entries, Utc::now())?;

    let out = PathBuf::from(sub.get_one::<String>("out").unwrap());
    std::fs::write(&out, &der).with_context(|| format!("writing {}", out.display()))?;

    println!(
        "wrote {} byte CRL covering {} revoked certificates to {}",
        der.len(),
        entries.len(),
        out.display()
    );
    Ok(())
}

fn cmd_revoke(sub: &ArgMatches) -> Result<()> {
    let (_config, _issuer, store) = load_store(sub)?;
    let serial = serial_arg(sub);

    let reason = sub.get_one::<String>("reason").map(String::as_str);
    if let Some(reason) = reason {
        if varsel::ocsp::types::RevocationReason::from_name(reason).is_none() {
            return Err(anyhow!("unknown revocation reason '{}'", reason));
        }
    }

    store.revoke(&serial, reason, Utc::now())?;
    println!("revoked {}", serial);
    Ok(())
}

fn cmd_restore(sub: &ArgMatches) -> Result<()> {
    let (_config, _issuer, store) = load_store(sub)?;
    let serial = serial_arg(sub);

    store.restore(&serial)?;
    println!("restored {}", serial);
    Ok(())
}

fn cmd_status(sub: &ArgMatches) -> Result<()> {
    let (_config, _issuer, store) = load_store(sub)?;
    let serial = serial_arg(sub);

    match store.fetch(&serial)? {
        Some(record) => {
            println!("serial:     {}", serial);
            println!("status:     {:?}", record.status);
            println!("expires:    {}", record.expiry_date);
            if !record.revocation_field.is_empty() {
                println!("revocation: {}", record.revocation_field);
            }
        }
        None => println!("serial {} not present in CA database", serial),
    }
    Ok(())
}
