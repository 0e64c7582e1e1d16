//! Command-line front end for the voting-power dispute protocol.
//!
//! Inspects settings and stake registries, builds proposer trees from snapshot
//! files, prints the index walk of a challenge, and runs seeded end-to-end
//! dispute simulations.

use power_dispute::expander::phase2_root;
use power_dispute::gindex::depth_for_count;
use power_dispute::{
    Address, BondLedger, Gindex, ManualClock, PowerRecord, ProposerTree, ProtocolSettings,
    ProtocolVerifier, SnapshotData, SnapshotFile, StakeRegistry, StaticSnapshot, TreeShape, TOKEN,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::{env, path::Path};

const DEFAULT_SETTINGS: &str = "dispute_settings.json";

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: dispute <settings|stake|tree|index|simulate> ...");
    println!("  settings show [--config <file>]");
    println!("  settings init <file>");
    println!("  stake show <registry.json>");
    println!("  stake deposit <registry.json> <address|label> <amount>");
    println!("  tree root --snapshot <file> [--dpr <N>]");
    println!("  tree respond --snapshot <file> --index <gindex> [--dpr <N>]");
    println!("  index chain --depth <D> --dpr <R> --target <gindex>");
    println!("  simulate [--parties <N>] [--dpr <R>] [--seed <u64>] [--dishonest]");
}

fn main() {
    let mut args = env::args().skip(1);
    let command = args.next();
    match command.as_deref() {
        Some("settings") => {
            let sub = args.next().unwrap_or_else(|| fatal("Usage: dispute settings <show|init> ..."));
            handle_settings(&sub, args.collect());
        }
        Some("stake") => {
            let sub = args.next().unwrap_or_else(|| fatal("Usage: dispute stake <show|deposit> ..."));
            handle_stake(&sub, args.collect());
        }
        Some("tree") => {
            let sub = args.next().unwrap_or_else(|| fatal("Usage: dispute tree <root|respond> ..."));
            handle_tree(&sub, args.collect());
        }
        Some("index") => {
            let sub = args.next().unwrap_or_else(|| fatal("Usage: dispute index chain ..."));
            match sub.as_str() {
                "chain" => cmd_index_chain(args.collect()),
                other => fatal(&format!("Unknown index subcommand: {other}")),
            }
        }
        Some("simulate") => cmd_simulate(args.collect()),
        Some("-h") | Some("--help") | None => print_help(),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn handle_settings(sub: &str, tail: Vec<String>) {
    match sub {
        "show" => {
            let mut config = DEFAULT_SETTINGS.to_string();
            let mut iter = tail.into_iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--config" => {
                        config = iter
                            .next()
                            .unwrap_or_else(|| fatal("--config expects a value"));
                    }
                    other => fatal(&format!("unknown argument: {other}")),
                }
            }
            let settings = ProtocolSettings::load(Path::new(&config))
                .unwrap_or_else(|err| fatal(&format!("failed to load {config}: {err}")));
            print_json(&settings);
        }
        "init" => {
            let path = tail
                .first()
                .unwrap_or_else(|| fatal("Usage: dispute settings init <file>"));
            ProtocolSettings::default()
                .save(Path::new(path))
                .unwrap_or_else(|err| fatal(&format!("failed to write {path}: {err}")));
            println!("QSYS|mod=CONFIG|evt=WRITTEN|path={path}");
        }
        _ => fatal(&format!("Unknown settings subcommand: {sub}")),
    }
}

fn handle_stake(sub: &str, tail: Vec<String>) {
    match sub {
        "show" => {
            let path = tail
                .first()
                .unwrap_or_else(|| fatal("Usage: dispute stake show <registry.json>"));
            let registry = StakeRegistry::load(Path::new(path))
                .unwrap_or_else(|err| fatal(&format!("failed to load stake registry {path}: {err}")));
            print_json(&registry);
        }
        "deposit" => {
            if tail.len() < 3 {
                fatal("Usage: dispute stake deposit <registry.json> <address|label> <amount>");
            }
            let path = Path::new(&tail[0]);
            let party = parse_party(&tail[1]);
            let amount: u128 = tail[2].parse().unwrap_or_else(|_| fatal("invalid amount"));
            let mut registry = StakeRegistry::load(path)
                .unwrap_or_else(|err| fatal(&format!("failed to load stake registry: {err}")));
            registry
                .deposit(&party, amount)
                .unwrap_or_else(|err| fatal(&format!("deposit failed: {err}")));
            registry
                .save(path)
                .unwrap_or_else(|err| fatal(&format!("failed to save stake registry: {err}")));
            println!(
                "deposited {amount} for {party}, staked={} free={}",
                registry.staked(&party),
                registry.free_balance(&party)
            );
        }
        _ => fatal(&format!("Unknown stake subcommand: {sub}")),
    }
}

fn handle_tree(sub: &str, tail: Vec<String>) {
    let mut snapshot_path: Option<String> = None;
    let mut index: Option<Gindex> = None;
    let mut dpr = ProtocolSettings::default().depth_per_round;
    let mut iter = tail.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--snapshot" => {
                snapshot_path = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--snapshot expects a value")),
                );
            }
            "--index" => {
                let raw = iter.next().unwrap_or_else(|| fatal("--index expects a value"));
                index = Some(raw.parse().unwrap_or_else(|_| fatal("invalid --index")));
            }
            "--dpr" => {
                let raw = iter.next().unwrap_or_else(|| fatal("--dpr expects a value"));
                dpr = raw.parse().unwrap_or_else(|_| fatal("invalid --dpr"));
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }
    let snapshot_path = snapshot_path.unwrap_or_else(|| fatal("--snapshot is required"));
    let file = SnapshotFile::load(Path::new(&snapshot_path))
        .unwrap_or_else(|err| fatal(&format!("failed to load snapshot: {err}")));
    let block = file.block;
    let source = StaticSnapshot::from(file);
    let tree = ProposerTree::from_snapshot(&source, block, dpr)
        .unwrap_or_else(|err| fatal(&format!("failed to build tree: {err}")));

    match sub {
        "root" => print_json(&json!({
            "block": block,
            "shape": tree.shape(),
            "root": tree.root(),
            "root_pollard": tree.root_pollard(),
        })),
        "respond" => {
            let index = index.unwrap_or_else(|| fatal("--index is required"));
            let response = tree
                .response(index)
                .unwrap_or_else(|err| fatal(&format!("cannot answer index {index}: {err}")));
            print_json(&response);
        }
        _ => fatal(&format!("Unknown tree subcommand: {sub}")),
    }
}

fn cmd_index_chain(args: Vec<String>) {
    let mut depth: Option<u32> = None;
    let mut dpr: Option<u32> = None;
    let mut target: Option<Gindex> = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().unwrap_or_else(|| fatal(&format!("{flag} expects a value")));
        match arg.as_str() {
            "--depth" => depth = Some(value("--depth").parse().unwrap_or_else(|_| fatal("invalid --depth"))),
            "--dpr" => dpr = Some(value("--dpr").parse().unwrap_or_else(|_| fatal("invalid --dpr"))),
            "--target" => {
                target = Some(value("--target").parse().unwrap_or_else(|_| fatal("invalid --target")))
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }
    let shape = TreeShape::new(
        depth.unwrap_or_else(|| fatal("--depth is required")),
        dpr.unwrap_or_else(|| fatal("--dpr is required")),
    );
    let target = target.unwrap_or_else(|| fatal("--target is required"));
    if !shape.is_challengeable(target) {
        fatal(&format!("index {target} is outside the game tree"));
    }
    for gindex in shape.ancestor_chain(target) {
        println!(
            "QSYS|mod=INDEX|evt=ROUND|index={gindex}|phase={:?}|parent={}|nodes={}|witness={}",
            shape.phase(gindex),
            shape.parent_round(gindex),
            shape.expected_nodes(gindex),
            shape.witness_len(gindex)
        );
    }
}

struct SimulateOptions {
    parties: usize,
    dpr: u32,
    seed: u64,
    dishonest: bool,
}

fn cmd_simulate(args: Vec<String>) {
    let mut opts = SimulateOptions {
        parties: 6,
        dpr: 2,
        seed: 7,
        dishonest: false,
    };
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--parties" => {
                let raw = iter.next().unwrap_or_else(|| fatal("--parties expects a value"));
                opts.parties = raw.parse().unwrap_or_else(|_| fatal("invalid --parties"));
            }
            "--dpr" => {
                let raw = iter.next().unwrap_or_else(|| fatal("--dpr expects a value"));
                opts.dpr = raw.parse().unwrap_or_else(|_| fatal("invalid --dpr"));
            }
            "--seed" => {
                let raw = iter.next().unwrap_or_else(|| fatal("--seed expects a value"));
                opts.seed = raw.parse().unwrap_or_else(|_| fatal("invalid --seed"));
            }
            "--dishonest" => opts.dishonest = true,
            other => fatal(&format!("unknown argument: {other}")),
        }
    }
    if opts.parties == 0 {
        fatal("--parties must be at least 1");
    }
    run_simulation(&opts);
}

fn run_simulation(opts: &SimulateOptions) {
    const BLOCK: u64 = 1;
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let parties: Vec<Address> = (0..opts.parties)
        .map(|i| Address::from_label(&format!("node-{i}")))
        .collect();
    let delegations = (0..opts.parties)
        .map(|p| {
            (0..opts.parties)
                .map(|i| {
                    if i == p {
                        rng.gen_range(1..=1_000u128) * TOKEN
                    } else if rng.gen_bool(0.25) {
                        rng.gen_range(1..=100u128) * TOKEN
                    } else {
                        0
                    }
                })
                .collect()
        })
        .collect();
    let data = SnapshotData {
        parties,
        delegations,
    };
    let mut snapshot = StaticSnapshot::new();
    snapshot.insert(BLOCK, data.clone());

    let settings = ProtocolSettings {
        depth_per_round: opts.dpr,
        ..ProtocolSettings::default()
    };
    settings
        .validate()
        .unwrap_or_else(|err| fatal(&err.to_string()));

    let proposer = Address::from_label("proposer");
    let challenger = Address::from_label("challenger");
    let mut ledger = StakeRegistry::default();
    for party in [proposer, challenger] {
        ledger
            .deposit(&party, 1_000 * TOKEN)
            .unwrap_or_else(|err| fatal(&err.to_string()));
    }

    // The proposer's tree; the dishonest variant inflates one record and the
    // aggregate above it, so the lie only shows against the snapshot.
    let depth = depth_for_count(opts.parties as u64);
    let shape = TreeShape::new(depth, opts.dpr);
    let records: Vec<Vec<PowerRecord>> = (0..opts.parties as u64).map(|p| data.records(p)).collect();
    let honest = ProposerTree::from_snapshot(&snapshot, BLOCK, opts.dpr)
        .unwrap_or_else(|err| fatal(&err.to_string()));
    let victim = rng.gen_range(0..opts.parties as u64);
    let inflated_record = rng.gen_range(0..opts.parties);
    let tree = if opts.dishonest {
        let mut forged = records.clone();
        forged[victim as usize][inflated_record].power += TOKEN;
        let mut leaves = honest.phase1_leaves().to_vec();
        leaves[victim as usize] =
            phase2_root(&forged[victim as usize], depth).unwrap_or_else(|err| fatal(&err.to_string()));
        ProposerTree::new(shape, &leaves, &forged).unwrap_or_else(|err| fatal(&err.to_string()))
    } else {
        honest
    };

    let clock = ManualClock::new(1_700_000_000);
    let mut verifier = ProtocolVerifier::new(settings, ledger, snapshot, clock.clone())
        .unwrap_or_else(|err| fatal(&err.to_string()));
    let id = verifier
        .create_proposal(proposer, BLOCK, depth, tree.root_pollard())
        .unwrap_or_else(|err| fatal(&err.to_string()));

    let phase1_leaf = (1u64 << depth) + victim;
    let target = if opts.dishonest {
        (phase1_leaf << depth) + inflated_record as u64
    } else {
        (phase1_leaf << depth) + rng.gen_range(0..(1u64 << depth))
    };
    let chain = shape.ancestor_chain(target);
    let mut defeated = false;
    for &gindex in &chain {
        verifier
            .create_challenge(id, gindex, challenger)
            .unwrap_or_else(|err| fatal(&err.to_string()));
        clock.advance(60);
        let response = tree
            .response(gindex)
            .unwrap_or_else(|err| fatal(&err.to_string()));
        if let Err(err) = verifier.submit_root(id, gindex, proposer, &response.witness, &response.nodes) {
            println!("QSYS|mod=DISPUTE|evt=RESPONSE_REJECTED|proposal={id}|index={gindex}|err={err}");
            clock.advance(settings.challenge_period);
            verifier
                .defeat_proposal(id, gindex)
                .unwrap_or_else(|err| fatal(&err.to_string()));
            defeated = true;
            break;
        }
    }

    let claimed: Vec<Gindex> = chain
        .iter()
        .copied()
        .filter(|g| verifier.proposal(id).map(|p| p.challenge(*g).is_some()).unwrap_or(false))
        .collect();
    if defeated {
        verifier
            .claim_challenger_bond(id, challenger, &claimed)
            .unwrap_or_else(|err| fatal(&err.to_string()));
    } else {
        clock.advance(settings.lifetime());
        verifier
            .finalize_vote(id, true)
            .unwrap_or_else(|err| fatal(&err.to_string()));
        let mut indices = vec![power_dispute::ROOT];
        indices.extend(claimed);
        verifier
            .claim_proposer_bond(id, proposer, &indices)
            .unwrap_or_else(|err| fatal(&err.to_string()));
    }

    for event in verifier.drain_events() {
        println!("{event}");
    }
    let state = verifier
        .proposal_state(id)
        .unwrap_or_else(|err| fatal(&err.to_string()));
    println!("QSYS|mod=SIM|evt=DONE|proposal={id}|state={state}");
    for (party, account) in verifier.ledger().accounts() {
        println!(
            "QSYS|mod=SIM|evt=BALANCE|party={party}|staked={}|locked={}",
            account.staked, account.locked
        );
    }
}

fn parse_party(raw: &str) -> Address {
    if raw.starts_with("0x") {
        raw.parse().unwrap_or_else(|err: String| fatal(&err))
    } else {
        Address::from_label(raw)
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    println!("{pretty}");
}
