use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flight-odbc-client"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_unknown_flags_print_usage_and_exit_1() {
    for args in [&["--bogus"][..], &["-x"], &["--help"], &["--port"]] {
        let output = run(args);

        assert_eq!(output.status.code(), Some(1), "{args:?}");
        assert!(output.stdout.is_empty(), "{args:?}");

        let stderr = String::from_utf8(output.stderr).unwrap();
        assert!(stderr.starts_with("Usage: "), "{args:?}: {stderr}");
        assert!(stderr.contains("  --disable-cert-verify, -k   Disable certificate verification"));
    }
}

#[test]
fn test_unreachable_server_fails() {
    // nothing listens on port 1
    let output = run(&["-h", "127.0.0.1", "-p", "1", "-n"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("connecting to the Flight SQL server"), "{stderr}");
}
