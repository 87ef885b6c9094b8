use std::path::Path;

use hazgrid_state::InteropRecordStore;

pub fn list(db: &str, format: &str) -> anyhow::Result<()> {
    let store = InteropRecordStore::open(Path::new(db))?;
    let records = store.list_all()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            if records.is_empty() {
                println!("no interop records");
                return Ok(());
            }
            for record in &records {
                let key = match record.etn {
                    Some(etn) => format!("etn-{etn}"),
                    None => record.time_range.key_fragment(),
                };
                println!(
                    "{}/{}.{}  event={}  {}  parm={}",
                    record.site,
                    record.phenomenon,
                    record.significance,
                    record.event_id,
                    key,
                    record.parm_id
                );
            }
            println!("{} record(s)", records.len());
        }
    }

    Ok(())
}
