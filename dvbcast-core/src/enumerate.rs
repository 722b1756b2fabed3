//! Discovery of attached tuners: walks the DVB adapter tree and builds one
//! [`Frontend`] per frontend device node.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::device::{DvbDriver, FeId};
use crate::frontend::Frontend;

/// Recursively collect `(adapter, frontend)` index pairs below `dir`.
fn collect_frontends(dir: &Path, found: &mut Vec<(u32, u32)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_frontends(&path, found);
            continue;
        }
        let name = entry.file_name();
        let Some(fe_nr) = name
            .to_str()
            .and_then(|n| n.strip_prefix("frontend"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        let adapter_nr = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("adapter"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(adapter_nr) = adapter_nr {
            found.push((adapter_nr, fe_nr));
        }
    }
}

/// Walk `adapter_root` (normally `/dev/dvb`) and construct a frontend for
/// every `adapterN/frontendM` node, in device order.
pub fn enumerate_frontends(
    driver: &Arc<dyn DvbDriver>,
    adapter_root: &Path,
) -> Vec<Arc<Frontend>> {
    info!("Detecting frontends in: {}", adapter_root.display());
    let mut found = Vec::new();
    collect_frontends(adapter_root, &mut found);
    found.sort_unstable();
    found.dedup();

    let mut frontends = Vec::new();
    for (adapter_nr, fe_nr) in found {
        let adapter = adapter_root.join(format!("adapter{adapter_nr}"));
        let frontend = Frontend::new(
            FeId(frontends.len() as u16),
            driver.clone(),
            adapter.join(format!("frontend{fe_nr}")),
            adapter.join(format!("demux{fe_nr}")),
            adapter.join(format!("dvr{fe_nr}")),
        );
        frontends.push(Arc::new(frontend));
    }
    info!("Frontends found: {}", frontends.len());
    frontends
}
