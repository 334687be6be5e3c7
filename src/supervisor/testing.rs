//! Shared fixtures for async task tests

use std::future::Future;
use std::rc::Rc;

use nalgebra::Vector3;
use tempfile::TempDir;

use crate::calibration::model::dip_angle;
use crate::calibration::CalibrationModel;
use crate::hardware::{MockHardware, MockNvm, NonVolatileMemory, Storage};
use crate::utils::{Config, ConfigStore};

use super::{DeviceContext, ModeRequests};

pub(crate) struct Rig {
    pub ctx: Rc<DeviceContext<MockHardware>>,
    pub modes: ModeRequests,
    pub nvm: Rc<MockNvm>,
    pub dir: TempDir,
}

/// Mock device on a fresh temporary storage root
pub(crate) fn rig(config: ConfigStore) -> Rig {
    let dir = TempDir::new().unwrap();
    let nvm = Rc::new(MockNvm::new(256));
    let shared: Rc<dyn NonVolatileMemory> = nvm.clone();
    let (ctx, modes) = DeviceContext::with_config(MockHardware::new(), Storage::new(dir.path()), shared, config);
    Rig { ctx: Rc::new(ctx), modes, nvm, dir }
}

/// Identity model whose reference field is exactly what the mock reports at rest
pub(crate) fn calibrated_config() -> ConfigStore {
    let mag = Vector3::new(0.0, 20.0, -45.0);
    let grav = Vector3::new(0.0, 0.0, 9.81);
    let model = CalibrationModel::identity(mag.norm(), grav.norm(), dip_angle(&mag, &grav));
    ConfigStore::new(Config { calibration: Some(model), ..Config::default() })
}

pub(crate) async fn run_local<F: Future>(fut: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(fut).await
}
