// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use rundag::cli::CliArgs;
use rundag::config::{default_config_path, load_and_validate, parse_duration};
use rundag::errors::RundagError;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_loads_with_defaults_applied() {
    let file = write_config(
        r#"
[controller.labels]
team = "data"

[[graph.etl.step]]
name = "extract"
image = "sh"
command = ["sh", "-c", "echo extracting"]

[[graph.etl.step]]
name = "load"
image = "loader:2"
replicas = 3
dependencies = ["extract"]
args = ["--fast"]
envs = { TARGET = "warehouse" }

[run.nightly]
graph = "etl"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid config");

    assert_eq!(cfg.controller.namespace, "default");
    assert_eq!(cfg.controller.finalizer, "graph.rundag.dev/finalizer");
    assert_eq!(cfg.controller.unit_port, 8000);
    assert_eq!(cfg.controller.run_as_user, 1000);
    assert_eq!(cfg.controller.resync_interval, Duration::from_secs(30));
    assert_eq!(cfg.controller.requeue_delay, Duration::from_secs(5));
    assert_eq!(cfg.controller.labels.get("team").map(String::as_str), Some("data"));

    let graph = &cfg.graphs["etl"];
    assert_eq!(graph.metadata.namespace, "default");
    assert_eq!(graph.spec.steps.len(), 2);
    let extract = graph.step("extract").unwrap();
    assert_eq!(extract.replicas, 1);
    assert!(extract.dependencies.is_empty());
    let load = graph.step("load").unwrap();
    assert_eq!(load.replicas, 3);
    assert_eq!(load.dependencies, vec!["extract"]);
    assert_eq!(load.args, vec!["--fast"]);
    assert_eq!(load.envs.get("TARGET").map(String::as_str), Some("warehouse"));

    let run = &cfg.runs["nightly"];
    assert_eq!(run.spec.graph_name, "etl");
    assert_eq!(run.metadata.namespace, "default");

    let ctx = cfg.scheduling_context();
    assert_eq!(ctx.namespace, "default");
    assert_eq!(ctx.labels.len(), 1);
    let options = cfg.controller_options(true);
    assert!(options.exit_when_done);
    assert_eq!(options.resync_interval, Duration::from_secs(30));
}

#[test]
fn controller_section_overrides_defaults() {
    let file = write_config(
        r#"
[controller]
namespace = "jobs"
finalizer = "example.com/cleanup"
unit_port = 9000
run_as_user = 2000
resync_interval = "2m"
requeue_delay = "250ms"

[[graph.g.step]]
name = "a"
image = "busybox"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.controller.namespace, "jobs");
    assert_eq!(cfg.controller.finalizer, "example.com/cleanup");
    assert_eq!(cfg.controller.unit_port, 9000);
    assert_eq!(cfg.controller.run_as_user, 2000);
    assert_eq!(cfg.controller.resync_interval, Duration::from_secs(120));
    assert_eq!(cfg.controller.requeue_delay, Duration::from_millis(250));
    assert_eq!(cfg.graphs["g"].metadata.namespace, "jobs");
    assert!(cfg.runs.is_empty());
}

#[test]
fn cyclic_graph_is_rejected() {
    let file = write_config(
        r#"
[[graph.g.step]]
name = "a"
image = "busybox"
dependencies = ["b"]

[[graph.g.step]]
name = "b"
image = "busybox"
dependencies = ["a"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(RundagError::CycleDetected { path }) => {
            assert!(path.contains(&"a".to_string()));
            assert!(path.contains(&"b".to_string()));
        }
        Err(e) => panic!("Expected CycleDetected error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_is_rejected() {
    let file = write_config(
        r#"
[[graph.g.step]]
name = "a"
image = "busybox"
dependencies = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(RundagError::UnknownReference { from, to }) => {
            assert_eq!(from, "a");
            assert_eq!(to, "NonExistent");
        }
        Err(e) => panic!("Expected UnknownReference, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn run_with_unknown_graph_is_a_config_error() {
    let file = write_config(
        r#"
[[graph.g.step]]
name = "a"
image = "busybox"

[run.r]
graph = "other"
"#,
    );

    match load_and_validate(file.path()) {
        Err(RundagError::Config(msg)) => {
            assert!(msg.contains("unknown graph"), "{msg}");
            assert!(msg.contains("other"), "{msg}");
        }
        Err(e) => panic!("Expected Config error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn config_without_graphs_is_rejected() {
    let file = write_config(
        r#"
[controller]
namespace = "default"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(RundagError::Config(_))
    ));
}

#[test]
fn replicas_out_of_range_is_rejected() {
    let file = write_config(
        r#"
[[graph.g.step]]
name = "a"
image = "busybox"
replicas = 20
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(RundagError::InvalidDefinition(_))
    ));
}

#[test]
fn bad_durations_are_config_errors() {
    let file = write_config(
        r#"
[controller]
resync_interval = "soon"

[[graph.g.step]]
name = "a"
image = "busybox"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(RundagError::Config(_))
    ));

    let zero = write_config(
        r#"
[controller]
resync_interval = "0s"

[[graph.g.step]]
name = "a"
image = "busybox"
"#,
    );
    assert!(matches!(
        load_and_validate(zero.path()),
        Err(RundagError::Config(_))
    ));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[[graph.g.step]\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(RundagError::Toml(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/here/Rundag.toml"),
        Err(RundagError::Io(_))
    ));
}

#[test]
fn duration_grammar() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
    assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("3d").is_err());
}

#[test]
fn cli_defaults_to_the_standard_config_path() {
    let args = CliArgs::try_parse_from(["rundag"]).unwrap();
    assert_eq!(args.config, default_config_path());
    assert!(!args.once);
    assert!(!args.dry_run);

    let args = CliArgs::try_parse_from(["rundag", "--config", "other.toml", "--once"]).unwrap();
    assert_eq!(args.config, std::path::PathBuf::from("other.toml"));
    assert!(args.once);
}
