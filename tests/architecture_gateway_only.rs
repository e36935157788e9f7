use std::fs;
use std::path::{Path, PathBuf};

/// Files allowed to talk the gateway wire protocol directly
const ALLOWED_WIRE_USERS: &[&str] = &["src/adapters/discord_gateway.rs", "src/error.rs"];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

fn offending_lines(needles: &[&str], allowed: &[&str]) -> Vec<String> {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rust_files(&repo_root.join("src"), &mut files);

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if allowed.iter().any(|a| *a == rel) {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if needles.iter().any(|n| trimmed.contains(n)) {
                offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
            }
        }
    }
    offenders
}

#[test]
fn websocket_protocol_is_confined_to_the_gateway_adapter() {
    let offenders = offending_lines(&["tokio_tungstenite", "connect_async("], ALLOWED_WIRE_USERS);
    assert!(
        offenders.is_empty(),
        "gateway wire protocol used outside the adapter:\n{}",
        offenders.join("\n")
    );
}

#[test]
fn supervisor_only_depends_on_the_gateway_traits() {
    let offenders = offending_lines(
        &["DiscordGateway", "DiscordSession", "DiscordRest"],
        &[
            "src/adapters/mod.rs",
            "src/adapters/discord_gateway.rs",
            "src/adapters/discord_rest.rs",
            "src/main.rs",
        ],
    );
    assert!(
        offenders.is_empty(),
        "concrete Discord adapters referenced outside adapters and main:\n{}",
        offenders.join("\n")
    );
}
