use anyhow::Result;
use std::path::Path;
use std::process::Command;
use stemforge_core::Config;
use stemforge_models::SpleeterModel;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("stemforge dependency check\n");

    let mut all_ok = true;

    // Check FFmpeg
    print!("ffmpeg:        ");
    match config.ffmpeg_path() {
        Ok(path) => match Command::new(&path).arg("-version").output() {
            Ok(out) => {
                let first_line = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .to_string();
                // Extract just version number
                let version_part = first_line.split_whitespace().nth(2).unwrap_or("unknown");
                println!("OK ({})", version_part);
            }
            Err(_) => {
                println!("FOUND but failed to run ({})", path.display());
                all_ok = false;
            }
        },
        Err(_) => {
            println!("NOT FOUND");
            println!("               Install with: apt install ffmpeg (or brew install ffmpeg)");
            all_ok = false;
        }
    }

    // Check Python
    print!("python:        ");
    let venv = Config::venv_python_candidates().into_iter().find(|p| p.exists());
    match config.python_path() {
        Ok(python) => {
            let origin = if config.paths.python.is_some() {
                "configured"
            } else if venv.as_deref() == Some(python.as_path()) {
                "venv"
            } else {
                "system"
            };
            match Command::new(&python).arg("--version").output() {
                Ok(out) => {
                    // Python 2 printed its version on stderr
                    let raw = if out.stdout.is_empty() { &out.stderr } else { &out.stdout };
                    let v = String::from_utf8_lossy(raw);
                    println!("OK ({}, {})", v.trim().replace("Python ", ""), origin);
                }
                Err(_) => {
                    println!("FOUND but failed to run ({})", python.display());
                    all_ok = false;
                }
            }

            // Check Spleeter
            print!("  spleeter:    ");
            let check = Command::new(&python)
                .args(["-c", "import spleeter; print(getattr(spleeter, '__version__', 'installed'))"])
                .output();
            match check {
                Ok(out) if out.status.success() => {
                    println!("OK ({})", String::from_utf8_lossy(&out.stdout).trim());
                }
                _ => {
                    println!("NOT INSTALLED");
                    println!("               Run: stemforge setup-models");
                    all_ok = false;
                }
            }
        }
        Err(_) => {
            println!("NOT FOUND");
            println!("               Install Python 3.8+, then run: stemforge setup-models");
            all_ok = false;
        }
    }

    // Check model name
    print!("model:         ");
    match SpleeterModel::from_str(&config.separation.model) {
        Some(model) if config.separation.enabled => {
            println!("{} ({})", model, model.stems().join(", "));
        }
        Some(model) => println!("{} (separation disabled)", model),
        None => {
            println!("UNKNOWN ({})", config.separation.model);
            println!("               Use spleeter:2stems, spleeter:4stems or spleeter:5stems");
            all_ok = false;
        }
    }

    // Check storage
    for (label, dir) in [
        ("uploads:       ", &config.storage.upload_dir),
        ("processed:     ", &config.storage.processed_dir),
    ] {
        print!("{}", label);
        match std::fs::create_dir_all(dir).and_then(|_| tempfile_probe(dir)) {
            Ok(()) => println!("OK ({})", dir.display()),
            Err(e) => {
                println!("NOT WRITABLE ({}: {})", dir.display(), e);
                all_ok = false;
            }
        }
    }

    println!();
    if all_ok {
        println!("All dependencies OK!");
    } else {
        println!("Some dependencies are missing. See above for installation instructions.");
    }

    Ok(())
}

fn tempfile_probe(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(".stemforge-write-test");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(probe)
}
