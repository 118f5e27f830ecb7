use clap::Parser;

use super::{Cli, Commands, LsOutput};

#[test]
fn test_run_args_parse() {
    let cli = Cli::parse_from([
        "tm",
        "run",
        "--nodes",
        "reviews,listings",
        "--start",
        "2023-01-01",
        "--end",
        "2023-01-02",
        "--backfill",
    ]);
    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.nodes.as_deref(), Some("reviews,listings"));
            assert_eq!(args.start.as_deref(), Some("2023-01-01"));
            assert!(args.backfill);
            assert!(!args.full_refresh);
            assert!(args.workers.is_none());
        }
        other => panic!("expected run, got {:?}", other),
    }
}

#[test]
fn test_global_args_apply_anywhere() {
    let cli = Cli::parse_from(["tm", "validate", "--project-dir", "/tmp/proj", "-v"]);
    assert!(cli.global.verbose);
    assert_eq!(cli.global.project_dir, "/tmp/proj");
    assert!(matches!(cli.command, Commands::Validate));
}

#[test]
fn test_plan_requires_node() {
    assert!(Cli::try_parse_from(["tm", "plan"]).is_err());
    let cli = Cli::parse_from(["tm", "plan", "reviews", "--full-refresh"]);
    match cli.command {
        Commands::Plan(args) => {
            assert_eq!(args.node, "reviews");
            assert!(args.full_refresh);
        }
        other => panic!("expected plan, got {:?}", other),
    }
}

#[test]
fn test_ls_output_default() {
    let cli = Cli::parse_from(["tm", "ls"]);
    match cli.command {
        Commands::Ls(args) => assert_eq!(args.output, LsOutput::Table),
        other => panic!("expected ls, got {:?}", other),
    }
}
