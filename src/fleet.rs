use std::{collections::HashMap, sync::Arc};

use tracing::info;

use crate::{
    api::{self, TransitApi},
    models::VehicleInfo,
};

/// Static fleet details (model, floor type) keyed by vehicle id, used to
/// decorate live vehicle popups.
#[derive(Debug, Default, Clone)]
pub struct FleetIndex {
    vehicles: HashMap<Arc<str>, VehicleInfo>,
}

impl FleetIndex {
    pub async fn load<A: TransitApi>(api: &A) -> Result<Self, api::Error> {
        let index: Self = api.fetch_vehicle_info().await?.into_iter().collect();
        info!("Loaded {} fleet entries", index.len());
        Ok(index)
    }

    pub fn get(&self, id: &str) -> Option<&VehicleInfo> {
        self.vehicles.get(id)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl FromIterator<VehicleInfo> for FleetIndex {
    fn from_iter<T: IntoIterator<Item = VehicleInfo>>(iter: T) -> Self {
        Self {
            vehicles: iter
                .into_iter()
                .map(|info| (info.id.clone(), info))
                .collect(),
        }
    }
}
