use parking_lot::Mutex;
use rowsheet_common::{RowError, SheetId};
use rowsheet_gateway::{DocumentGateway, GridRange};
use rustc_hash::FxHashMap;

use crate::codec::KeySet;

/// Header rows of the sheets touched by one request.
///
/// A registry lives exactly as long as the request that created it; nothing
/// is shared between requests, so an edited header is picked up on the next one.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    cache: Mutex<FxHashMap<SheetId, KeySet>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row 0 of the sheet, flattened. An empty header row is an empty key set.
    pub fn get_keys<G: DocumentGateway + ?Sized>(
        &self,
        gateway: &G,
        doc: &str,
        sheet_id: SheetId,
    ) -> Result<KeySet, RowError> {
        if let Some(keys) = self.cache.lock().get(&sheet_id) {
            return Ok(keys.clone());
        }
        let ranges = gateway
            .get_by_filter(doc, &[GridRange::header(sheet_id).into()])
            .map_err(|e| RowError::remote_read(e).with_sheet(sheet_id))?;
        let keys: KeySet = ranges
            .into_iter()
            .flat_map(|r| r.values)
            .flatten()
            .collect();
        self.cache.lock().insert(sheet_id, keys.clone());
        Ok(keys)
    }

    pub fn forget(&self, sheet_id: SheetId) {
        self.cache.lock().remove(&sheet_id);
    }
}
