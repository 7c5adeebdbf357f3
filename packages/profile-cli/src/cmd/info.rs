use color_eyre::eyre::Result;
use serde_json::json;

use super::open_profile;

pub fn run(target: &str, as_json: bool) -> Result<()> {
    let profile = open_profile(target)?;
    let info = profile.info();

    if as_json {
        let controls: Vec<_> = info
            .controls
            .values()
            .map(|c| {
                json!({
                    "id": c.id,
                    "title": c.title,
                    "desc": c.desc,
                    "impact": c.impact,
                    "tags": c.tags,
                })
            })
            .collect();
        let out = json!({
            "name": info.name,
            "title": info.title,
            "version": info.version.map(|v| v.to_string()),
            "controls": controls,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{} ({})", info.name, info.title.unwrap_or_default());
        for (id, c) in &info.controls {
            println!("  {id}: impact={:.2} title={:?}", c.impact, c.title);
        }
    }
    Ok(())
}
