use color_eyre::eyre::Result;

use super::open_profile;

pub fn run(target: &str, json: bool) -> Result<()> {
    let profile = open_profile(target)?;
    let report = profile.check();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} controls, valid={}",
            report.summary.controls, report.summary.valid
        );
        for e in &report.errors {
            println!("error: {}", e.msg);
        }
        for w in &report.warnings {
            println!("warning: {}", w.msg);
        }
    }

    if !report.summary.valid {
        std::process::exit(1);
    }
    Ok(())
}
