use std::{env, process::Command};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let commit = match stdout_of("git", &["rev-parse", "--short", "HEAD"]) {
        Some(hash) if !hash.is_empty() => {
            let dirty = stdout_of("git", &["status", "--porcelain"]).is_some_and(|s| !s.is_empty());
            if dirty {
                format!("{hash}-dirty")
            } else {
                hash
            }
        }
        _ => "unknown".to_string(),
    };
    emit("COMMIT", &commit);
    emit("DATE", &chrono::Utc::now().format("%Y-%m-%d").to_string());
    for key in ["TARGET", "PROFILE"] {
        let value = env::var(key).unwrap_or_else(|_| "unknown".into());
        emit(key, &value);
    }
}

fn emit(key: &str, value: &str) {
    println!("cargo:rustc-env=TALLY_BUILD_{key}={value}");
}

/// Trimmed stdout of a successful command, `None` if it could not run or failed.
fn stdout_of(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
