//! voicecoach-control - CLI control utility for the VoiceCoach daemon
//!
//! Drives a rehearsal session over D-Bus: submit a script, pick a voice,
//! listen to the demonstration and practice against it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zbus::blocking::Connection;

/// CLI control utility for the VoiceCoach daemon
#[derive(Parser)]
#[command(name = "voicecoach-control")]
#[command(version)]
#[command(about = "Control utility for the VoiceCoach rehearsal daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service health
    Ping,

    /// Get daemon version
    Version,

    /// List demonstration voices
    Voices,

    /// Select the demonstration voice
    Select {
        /// Voice id (see `voices`)
        voice: String,
    },

    /// Set the script, or show it when no text is given
    Script {
        /// Script text
        text: Option<String>,
        /// Read the script from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Play or stop the demonstration
    Toggle,

    /// Stop the demonstration
    Stop,

    /// Hear a short sample of a voice
    Preview {
        /// Voice id
        voice: String,
    },

    /// Show playback status
    Status,

    /// Save the demonstration as a WAV file
    Export {
        /// Target directory (defaults to the configured download directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Rewrite the script for reading aloud
    Optimize,

    /// Record yourself reading the script and get feedback
    Practice {
        /// Recording duration in seconds (0 = configured default)
        #[arg(short, long, default_value = "0")]
        duration: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let conn = Connection::session()?;

    let dest = "org.voicecoach.Service";
    let path = "/org/voicecoach/Service";
    let iface = "org.voicecoach.Service";

    match cli.command {
        Commands::Ping => {
            let result: String = conn
                .call_method(Some(dest), path, Some(iface), "Ping", &())?
                .body()
                .deserialize()?;
            println!("{}", result);
        }

        Commands::Version => {
            let result: String = conn
                .call_method(Some(dest), path, Some(iface), "GetVersion", &())?
                .body()
                .deserialize()?;
            println!("voicecoach {}", result);
        }

        Commands::Voices => {
            let voices: Vec<(String, String, String)> = conn
                .call_method(Some(dest), path, Some(iface), "ListVoices", &())?
                .body()
                .deserialize()?;
            let selected: String = conn
                .call_method(Some(dest), path, Some(iface), "GetSelectedVoice", &())?
                .body()
                .deserialize()?;

            println!("Demonstration Voices");
            println!("────────────────────");
            for (id, name, label) in voices {
                let marker = if id == selected { "*" } else { " " };
                println!("{} {:<8} {}", marker, name, label);
            }
            println!("\n* = selected");
        }

        Commands::Select { voice } => {
            let _: () = conn
                .call_method(Some(dest), path, Some(iface), "SelectVoice", &voice)?
                .body()
                .deserialize()?;
            println!("Voice: {}", voice);
        }

        Commands::Script { text, file } => {
            let text = match (text, file) {
                (Some(text), _) => Some(text),
                (None, Some(file)) => Some(std::fs::read_to_string(file)?),
                (None, None) => None,
            };
            match text {
                Some(text) => {
                    let _: () = conn
                        .call_method(Some(dest), path, Some(iface), "SetScript", &text)?
                        .body()
                        .deserialize()?;
                    println!("Script set ({} chars)", text.chars().count());
                }
                None => {
                    let script: String = conn
                        .call_method(Some(dest), path, Some(iface), "GetScript", &())?
                        .body()
                        .deserialize()?;
                    if script.is_empty() {
                        println!("No script set");
                    } else {
                        println!("{}", script);
                    }
                }
            }
        }

        Commands::Toggle => {
            println!("Generating...");
            let outcome: String = conn
                .call_method(Some(dest), path, Some(iface), "ToggleDemo", &())?
                .body()
                .deserialize()?;
            match outcome.as_str() {
                "started" => println!("Playing demonstration"),
                "stopped" => println!("Demonstration stopped"),
                "busy" => println!("Still generating, try again shortly"),
                "superseded" => println!("Script or voice changed while generating; toggle again"),
                other => println!("{}", other),
            }
        }

        Commands::Stop => {
            let stopped: bool = conn
                .call_method(Some(dest), path, Some(iface), "StopDemo", &())?
                .body()
                .deserialize()?;

            if stopped {
                println!("Playback stopped");
            } else {
                println!("Nothing was playing");
            }
        }

        Commands::Preview { voice } => {
            let outcome: String = conn
                .call_method(Some(dest), path, Some(iface), "PreviewVoice", &voice)?
                .body()
                .deserialize()?;
            if outcome == "busy" {
                println!("Another preview is loading");
            } else {
                println!("Previewing {}", voice);
            }
        }

        Commands::Status => {
            let (state, outcome, voice, cached): (String, String, String, bool) = conn
                .call_method(Some(dest), path, Some(iface), "GetPlaybackStatus", &())?
                .body()
                .deserialize()?;

            println!("VoiceCoach Status");
            println!("─────────────────");
            println!("Playback:     {}", state);
            if !outcome.is_empty() {
                println!("Last session: {}", outcome);
            }
            println!("Voice:        {}", voice);
            println!("Demo cached:  {}", if cached { "Yes" } else { "No" });
        }

        Commands::Export { dir } => {
            let dir = dir.map(|d| d.display().to_string()).unwrap_or_default();
            let saved: String = conn
                .call_method(Some(dest), path, Some(iface), "ExportDemo", &dir)?
                .body()
                .deserialize()?;
            println!("Saved: {}", saved);
        }

        Commands::Optimize => {
            println!("Optimizing...");
            let script: String = conn
                .call_method(Some(dest), path, Some(iface), "OptimizeScript", &())?
                .body()
                .deserialize()?;
            println!("{}", script);
        }

        Commands::Practice { duration } => {
            println!("Recording... read your script now");
            let (score, pace, clarity, confidence, feedback): (u8, u8, u8, u8, Vec<String>) = conn
                .call_method(Some(dest), path, Some(iface), "PracticeDelivery", &duration)?
                .body()
                .deserialize()?;

            println!("Delivery Report");
            println!("───────────────");
            println!("Score:      {}", score);
            println!("Pace:       {}", pace);
            println!("Clarity:    {}", clarity);
            println!("Confidence: {}", confidence);
            for tip in feedback {
                println!("  - {}", tip);
            }
        }
    }

    Ok(())
}
