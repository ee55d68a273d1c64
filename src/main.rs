use std::{path::PathBuf, process::ExitCode};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use let_ledger::{
    units::{format_units, parse_units},
    Address, Amount, Ledger, LedgerError, Role, DECIMALS,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod store;

use store::StateStore;

//==================== CLI ====================//

#[derive(Parser)]
#[command(name = "let", version)]
#[command(about = "Deploy and operate a capped, role-gated LET issuance ledger", long_about = None)]
struct Cli {
    /// Ledger state file
    #[arg(long, env = "LET_STATE", default_value = "let-state.json", global = true)]
    state: PathBuf,

    /// Identity the command is executed as (0x-prefixed, 20 bytes)
    #[arg(long, env = "LET_CALLER", global = true)]
    caller: Option<Address>,

    /// Log filter, e.g. `info` or `let_ledger=debug`
    #[arg(long, env = "LET_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct AmountArg {
    /// Amount in raw units, or in whole tokens with --units
    amount: String,

    /// Interpret the amount as a decimal token quantity (18 decimals)
    #[arg(long)]
    units: bool,
}

impl AmountArg {
    fn resolve(&self) -> Result<Amount> {
        if self.units {
            parse_units(&self.amount, DECIMALS)
                .with_context(|| format!("invalid token amount {:?}", self.amount))
        } else {
            self.amount
                .trim()
                .parse()
                .with_context(|| format!("invalid raw amount {:?}", self.amount))
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new ledger owned by --caller
    Deploy {
        #[arg(long, default_value = "LET coin")]
        name: String,
        #[arg(long, default_value = "LET")]
        symbol: String,
        /// Replace an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Grant the minter role (owner only)
    SetMinter { account: Address },

    /// Revoke the minter role (owner only)
    RevokeMinter { account: Address },

    /// Set the emission cap; 0 removes it (owner only)
    SetMaxEmission {
        #[command(flatten)]
        amount: AmountArg,
    },

    /// Mint new supply (owner or minter)
    Mint {
        to: Address,
        #[command(flatten)]
        amount: AmountArg,
    },

    /// Hand the administrator role to another identity (owner only)
    TransferOwnership { new_owner: Address },

    /// Show token metadata, supply, cap and roles
    Info,

    /// Show the balance of an account
    Balance { account: Address },

    /// Check a role: `minter`, `admin` or a 0x role tag
    HasRole { role: String, account: Address },

    /// Print the event log as JSON lines
    Events,
}

//==================== commands ====================//

fn require_caller(cli: &Cli) -> Result<Address> {
    cli.caller
        .ok_or_else(|| anyhow!("--caller (or LET_CALLER) is required for this command"))
}

/// Applies `op` as the caller under the store's exclusive lock and persists
/// on success.
fn mutate(
    store: &StateStore,
    cli: &Cli,
    op: impl FnOnce(&mut Ledger, &Address) -> Result<(), LedgerError>,
) -> Result<Ledger> {
    let caller = require_caller(cli)?;
    store.update(|ledger| op(ledger, &caller).map_err(anyhow::Error::from))
}

fn deploy_cmd(store: &StateStore, cli: &Cli, name: &str, symbol: &str, force: bool) -> Result<()> {
    let deployer = require_caller(cli)?;
    println!("Deploying ledger with the account: {deployer}");
    let ledger = Ledger::new(deployer, name, symbol)?;
    store.create(&ledger, force)?;
    info!(path = %store.path().display(), "state file written");
    println!(
        "{} ledger deployed → {} (digest {})",
        ledger.symbol(),
        store.path().display(),
        ledger.snapshot().digest_hex()
    );
    Ok(())
}

fn info_cmd(store: &StateStore) -> Result<()> {
    let ledger = store.read()?;
    let snapshot = ledger.snapshot();
    println!("name:          {}", ledger.name());
    println!("symbol:        {}", ledger.symbol());
    println!("decimals:      {}", ledger.decimals());
    println!("owner:         {}", ledger.owner());
    println!(
        "total supply:  {} ({} {})",
        ledger.total_supply(),
        format_units(ledger.total_supply(), DECIMALS),
        ledger.symbol()
    );
    if ledger.max_emission() == 0 {
        println!("max emission:  uncapped");
    } else {
        println!(
            "max emission:  {} ({} {})",
            ledger.max_emission(),
            format_units(ledger.max_emission(), DECIMALS),
            ledger.symbol()
        );
    }
    let minters: Vec<String> = ledger.minters().map(|m| m.to_string()).collect();
    if minters.is_empty() {
        println!("minters:       none");
    } else {
        println!("minters:       {}", minters.join(", "));
    }
    println!("holders:       {}", ledger.holders().count());
    println!("digest:        {}", snapshot.digest_hex());
    Ok(())
}

fn balance_cmd(store: &StateStore, account: &Address) -> Result<()> {
    let ledger = store.read()?;
    let raw = ledger.balance_of(account);
    println!(
        "{account}: {raw} ({} {})",
        format_units(raw, DECIMALS),
        ledger.symbol()
    );
    Ok(())
}

fn has_role_cmd(store: &StateStore, role: &str, account: &Address) -> Result<()> {
    let Some(role) = Role::parse(role) else {
        bail!("unknown role {role:?} (expected minter, admin or a known role tag)");
    };
    let ledger = store.read()?;
    println!("{}", ledger.has_role(role, account));
    Ok(())
}

fn events_cmd(store: &StateStore) -> Result<()> {
    let ledger = store.read()?;
    for event in ledger.events() {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let store = StateStore::new(&cli.state);
    match &cli.command {
        Commands::Deploy {
            name,
            symbol,
            force,
        } => deploy_cmd(&store, cli, name, symbol, *force),
        Commands::SetMinter { account } => {
            mutate(&store, cli, |l, c| l.set_minter_role(c, *account))?;
            println!("minter role granted → {account}");
            Ok(())
        }
        Commands::RevokeMinter { account } => {
            mutate(&store, cli, |l, c| l.revoke_minter_role(c, *account))?;
            println!("minter role revoked → {account}");
            Ok(())
        }
        Commands::SetMaxEmission { amount } => {
            let cap = amount.resolve()?;
            mutate(&store, cli, |l, c| l.set_max_emission(c, cap))?;
            if cap == 0 {
                println!("max emission removed");
            } else {
                println!("max emission set → {cap}");
            }
            Ok(())
        }
        Commands::Mint { to, amount } => {
            let qty = amount.resolve()?;
            let ledger = mutate(&store, cli, |l, c| l.mint(c, *to, qty))?;
            println!(
                "minted {qty} → {to} (total supply {})",
                ledger.total_supply()
            );
            Ok(())
        }
        Commands::TransferOwnership { new_owner } => {
            mutate(&store, cli, |l, c| l.transfer_ownership(c, *new_owner))?;
            println!("ownership transferred → {new_owner}");
            Ok(())
        }
        Commands::Info => info_cmd(&store),
        Commands::Balance { account } => balance_cmd(&store, account),
        Commands::HasRole { role, account } => has_role_cmd(&store, role, account),
        Commands::Events => events_cmd(&store),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

//==================== main ====================//

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(rejected) = err.downcast_ref::<LedgerError>() {
                eprintln!(
                    "rejected [{}/{}]: {rejected}",
                    rejected.kind(),
                    rejected.code()
                );
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(exit_status(&err))
        }
    }
}

/// 2 when the ledger refused the operation, 1 for everything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<LedgerError>().is_some() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("let").chain(args.iter().copied())).unwrap()
    }

    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";

    fn cli_in(dir: &tempfile::TempDir, caller: &str, args: &[&str]) -> Cli {
        let state = dir.path().join("state.json");
        let mut full = vec!["--state", state.to_str().unwrap(), "--caller", caller];
        full.extend_from_slice(args);
        parse(&full)
    }

    #[test]
    fn amounts_accept_raw_and_decimal_forms() {
        let raw = AmountArg {
            amount: "1500".into(),
            units: false,
        };
        assert_eq!(raw.resolve().unwrap(), 1500);
        let units = AmountArg {
            amount: "1.5".into(),
            units: true,
        };
        assert_eq!(units.resolve().unwrap(), 1_500_000_000_000_000_000);
        let bad = AmountArg {
            amount: "1.5".into(),
            units: false,
        };
        assert!(bad.resolve().is_err());
    }

    #[test]
    fn deploy_then_operate_through_the_state_file() {
        let dir = tempfile::tempdir().unwrap();
        run(&cli_in(&dir, OWNER, &["deploy"])).unwrap();
        run(&cli_in(&dir, OWNER, &["set-minter", OTHER])).unwrap();
        run(&cli_in(&dir, OWNER, &["set-max-emission", "10"])).unwrap();
        run(&cli_in(&dir, OTHER, &["mint", OWNER, "10"])).unwrap();

        let store = StateStore::new(dir.path().join("state.json"));
        let ledger = store.read().unwrap();
        assert_eq!(ledger.name(), "LET coin");
        assert_eq!(ledger.owner(), OWNER.parse().unwrap());
        assert_eq!(ledger.total_supply(), 10);

        let err = run(&cli_in(&dir, OWNER, &["mint", OWNER, "1"])).unwrap_err();
        let rejected = err.downcast_ref::<LedgerError>().unwrap();
        assert_eq!(rejected.code(), "emission_limit_reached");
        assert_eq!(store.read().unwrap(), ledger);
    }

    #[test]
    fn non_owner_commands_are_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        run(&cli_in(&dir, OWNER, &["deploy"])).unwrap();
        let before = std::fs::read(dir.path().join("state.json")).unwrap();
        let err = run(&cli_in(&dir, OTHER, &["set-minter", OTHER])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::NotOwner { .. })
        ));
        assert_eq!(std::fs::read(dir.path().join("state.json")).unwrap(), before);
    }

    #[test]
    fn second_deploy_needs_force() {
        let dir = tempfile::tempdir().unwrap();
        run(&cli_in(&dir, OWNER, &["deploy"])).unwrap();
        assert!(run(&cli_in(&dir, OWNER, &["deploy"])).is_err());
        run(&cli_in(&dir, OTHER, &["deploy", "--force"])).unwrap();
    }

    #[test]
    fn rejections_exit_2_and_other_failures_exit_1() {
        let dir = tempfile::tempdir().unwrap();
        let missing = run(&cli_in(&dir, OWNER, &["mint", OWNER, "1"])).unwrap_err();
        assert_eq!(exit_status(&missing), 1);

        run(&cli_in(&dir, OWNER, &["deploy"])).unwrap();
        let rejected = run(&cli_in(&dir, OTHER, &["mint", OTHER, "1"])).unwrap_err();
        assert_eq!(exit_status(&rejected), 2);

        let state = dir.path().join("state.json");
        let no_caller = parse(&["--state", state.to_str().unwrap(), "mint", OWNER, "1"]);
        assert_eq!(exit_status(&run(&no_caller).unwrap_err()), 1);
    }

    #[test]
    fn concurrent_mints_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        run(&cli_in(&dir, OWNER, &["deploy"])).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        run(&cli_in(&dir, OWNER, &["mint", OWNER, "1"])).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    run(&cli_in(&dir, OWNER, &["info"])).unwrap();
                }
            });
        });

        let ledger = StateStore::new(dir.path().join("state.json")).read().unwrap();
        assert_eq!(ledger.total_supply(), 200);
        assert_eq!(ledger.events().len(), 201);
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(Cli::try_parse_from(["let", "balance", "0x1234"]).is_err());
    }
}
