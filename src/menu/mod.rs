//! Menu and menu-item foreground tasks
//!
//! The menu is a flat list: B scrolls, A selects. Settings change in place;
//! actions are handed to the MenuItem task through the device context.

pub mod actions;
pub mod items;

use std::rc::Rc;

use log::{debug, info, warn};

use crate::core::{Button, Click, InputEvent, Mode};
use crate::hardware::{Hardware, Tune};
use crate::supervisor::{DeviceContext, ModeRequest};

pub use items::{labels, MenuAction, MenuEntry, Setting, ENTRIES};

fn show_menu<H: Hardware>(ctx: &DeviceContext<H>, selected: usize) {
    let labels = labels(ctx.config.borrow().config());
    ctx.hw.show_menu(&labels, selected);
}

pub async fn menu_task<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    info!("Menu task started");
    let mut input = ctx.inputs.subscribe();
    let mut selected = 0;
    loop {
        show_menu(&ctx, selected);
        let event = input
            .wait_for(|e: &InputEvent| e.is_click(Button::A, Click::Single) || e.is_click(Button::B, Click::Single))
            .await;
        if event.is_click(Button::B, Click::Single) {
            selected = (selected + 1) % ENTRIES.len();
            ctx.hw.play(Tune::Bop).await;
            continue;
        }

        ctx.hw.play(Tune::Bip).await;
        match ENTRIES[selected] {
            MenuEntry::Action(action) => {
                debug!("Menu selected {:?}", action);
                ctx.start_action(action);
                return;
            }
            MenuEntry::Setting(setting) => {
                let result = setting.cycle(&mut ctx.config.borrow_mut());
                if let Err(e) = result {
                    warn!("Setting {:?} unchanged: {}", setting, e);
                }
            }
            MenuEntry::Back => {
                ctx.request_mode(ModeRequest::Switch(Mode::Measure));
                return;
            }
        }
    }
}

/// Run the pending action, then go back to the menu
pub async fn menu_item_task<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    let Some(action) = ctx.take_pending_action() else {
        warn!("Menu item started with nothing to do");
        ctx.request_mode(ModeRequest::Switch(Mode::Menu));
        return;
    };
    info!("Menu item task started: {}", action.label());
    match action {
        MenuAction::CalibrateSensors => actions::calibrate_sensors(&ctx).await,
        MenuAction::CalibrateLaser => actions::calibrate_laser(&ctx).await,
        MenuAction::CalFromSaved => actions::cal_from_saved(&ctx).await,
        MenuAction::RawReadings => actions::raw_readings(&ctx).await,
        MenuAction::CalibratedReadings => actions::calibrated_readings(&ctx).await,
        MenuAction::Orientation => actions::orientation(&ctx).await,
        MenuAction::DeviceInfo => actions::device_info(&ctx).await,
        MenuAction::ShowCalibrationResult => actions::show_calibration_result(&ctx).await,
    }
    if !ctx.shutdown.is_set() {
        ctx.request_mode(ModeRequest::Switch(Mode::Menu));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::synthetic::{scattered_shots, standard_capture, Instrument};
    use crate::calibration::{CalibrationEngine, SampleBatch};
    use crate::hardware::mock::{LaserResponse, ScreenEvent};
    use crate::hardware::PersistentMarkers;
    use crate::supervisor::testing::{calibrated_config, rig, run_local, Rig};
    use crate::supervisor::{Outcome, ShutdownReason};
    use crate::utils::ConfigStore;
    use approx::assert_abs_diff_eq;
    use tokio::task::spawn_local;
    use tokio::time::{sleep, Duration};

    fn click(rig: &Rig, button: Button) {
        rig.ctx.inputs.publish(InputEvent::Button(button, Click::Single));
    }

    async fn settle() {
        sleep(Duration::from_millis(300)).await;
    }

    /// Start `action` as the supervisor would
    fn start(rig: &Rig, action: MenuAction) -> tokio::task::JoinHandle<()> {
        rig.ctx.set_pending_action(action);
        spawn_local(menu_item_task(rig.ctx.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_menu_scrolls_and_starts_actions() {
        run_local(async {
            let mut rig = rig(calibrated_config());
            let task = spawn_local(menu_task(rig.ctx.clone()));
            settle().await;
            for _ in 0..3 {
                click(&rig, Button::B);
                settle().await;
            }
            match rig.ctx.hw.screen_events().last() {
                Some(ScreenEvent::Menu { labels, selected }) => {
                    assert_eq!(*selected, 3);
                    assert_eq!(labels[3], "Raw data");
                }
                other => panic!("expected the menu, got {other:?}"),
            }

            click(&rig, Button::A);
            task.await.unwrap();
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Bop, Tune::Bop, Tune::Bop, Tune::Bip]);
            assert_eq!(rig.modes.recv().await, Some(ModeRequest::Switch(Mode::MenuItem)));
            assert_eq!(rig.ctx.take_pending_action(), Some(MenuAction::RawReadings));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_change_in_place() {
        run_local(async {
            let mut rig = rig(ConfigStore::default());
            let task = spawn_local(menu_task(rig.ctx.clone()));
            settle().await;
            for _ in 0..7 {
                click(&rig, Button::B);
                settle().await;
            }
            click(&rig, Button::A);
            settle().await;
            assert_eq!(rig.ctx.config.borrow().config().timeout, 180);
            assert!(rig.ctx.config.borrow().is_dirty());
            match rig.ctx.hw.screen_events().last() {
                Some(ScreenEvent::Menu { labels, selected }) => {
                    assert_eq!(*selected, 7);
                    assert_eq!(labels[7], "Timeout: 180s");
                }
                other => panic!("expected the menu, got {other:?}"),
            }

            for _ in 0..6 {
                click(&rig, Button::B);
                settle().await;
            }
            click(&rig, Button::A);
            task.await.unwrap();
            assert_eq!(rig.modes.recv().await, Some(ModeRequest::Switch(Mode::Measure)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_requires_enough_samples_then_restarts() {
        run_local(async {
            let rig = rig(calibrated_config());
            let task = start(&rig, MenuAction::CalibrateSensors);
            settle().await;
            for _ in 0..3 {
                click(&rig, Button::A);
                settle().await;
            }
            click(&rig, Button::B);
            settle().await;
            let complaint = ScreenEvent::Info("Need at least\n12 shots\nHave 3".to_string());
            assert!(rig.ctx.hw.screen_events().contains(&complaint));
            assert!(!rig.ctx.shutdown.is_set());

            for _ in 0..9 {
                click(&rig, Button::A);
                settle().await;
            }
            click(&rig, Button::B);
            task.await.unwrap();

            assert_eq!(rig.ctx.shutdown.outcome(), Outcome::Planned(ShutdownReason::CalibrationRestart));
            assert!(rig.ctx.markers.calibration_due());
            let saved = SampleBatch::load(&rig.ctx.storage.calibration_data_path()).unwrap();
            assert_eq!(saved.len(), 12);
            assert_eq!(saved.mag[0], [0.0, 20.0, -45.0]);
            assert_eq!(rig.ctx.hw.measure_calls(), 0);
            // The next session reads the marker from the same NVM
            assert!(PersistentMarkers::new(rig.nvm.clone()).calibration_due());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cal_from_saved_needs_a_capture() {
        run_local(async {
            let rig = rig(calibrated_config());
            start(&rig, MenuAction::CalFromSaved).await.unwrap();
            assert_eq!(rig.ctx.hw.last_info().as_deref(), Some("No saved\ncalibration data"));
            assert!(!rig.ctx.markers.calibration_due());

            rig.ctx.storage.write(&rig.ctx.storage.calibration_data_path(), b"{\"mag\":[],\"grav\":[]}").unwrap();
            start(&rig, MenuAction::CalFromSaved).await.unwrap();
            assert!(rig.ctx.markers.calibration_due());
            assert_eq!(rig.ctx.shutdown.outcome(), Outcome::Planned(ShutdownReason::CalibrationRestart));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_laser_calibration_sets_offset() {
        run_local(async {
            let mut rig = rig(calibrated_config());
            rig.ctx.hw.set_default_distance(0.9);
            let task = start(&rig, MenuAction::CalibrateLaser);
            settle().await;
            assert_eq!(rig.ctx.hw.last_info().as_deref(), Some("Place device\n1m from an object\nand press A"));
            click(&rig, Button::A);
            task.await.unwrap();

            assert_eq!(rig.ctx.hw.measure_calls(), 10);
            assert_abs_diff_eq!(rig.ctx.config.borrow().config().laser_offset, 0.1, epsilon = 1e-9);
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Bip; 11]);
            assert_eq!(rig.modes.recv().await, Some(ModeRequest::Switch(Mode::Menu)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_laser_offset_needs_confirmation() {
        run_local(async {
            let rig = rig(calibrated_config());
            rig.ctx.hw.set_default_distance(0.6);
            let task = start(&rig, MenuAction::CalibrateLaser);
            settle().await;
            click(&rig, Button::A);
            sleep(Duration::from_secs(5)).await;
            assert!(rig.ctx.hw.last_info().unwrap().starts_with("Offset is 0.400m"));

            click(&rig, Button::B);
            task.await.unwrap();
            assert_eq!(rig.ctx.config.borrow().config().laser_offset, 0.0);
            assert!(!rig.ctx.config.borrow().is_dirty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_laser_calibration_aborts_on_timeout() {
        run_local(async {
            let rig = rig(calibrated_config());
            rig.ctx.hw.push_laser(LaserResponse::Distance(1.0));
            rig.ctx.hw.push_laser(LaserResponse::Hang);
            let task = start(&rig, MenuAction::CalibrateLaser);
            settle().await;
            click(&rig, Button::A);
            task.await.unwrap();

            assert_eq!(rig.ctx.hw.measure_calls(), 2);
            assert_eq!(rig.ctx.hw.last_info().as_deref(), Some("Laser\nTimeout"));
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Bip, Tune::Sad]);
            assert!(!rig.ctx.config.borrow().is_dirty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_screens_refresh_until_a() {
        run_local(async {
            let rig = rig(ConfigStore::default());
            let task = start(&rig, MenuAction::Orientation);
            sleep(Duration::from_millis(1200)).await;
            click(&rig, Button::A);
            task.await.unwrap();

            let shown: Vec<_> = rig
                .ctx
                .hw
                .screen_events()
                .into_iter()
                .filter(|e| *e == ScreenEvent::Info("Device not\ncalibrated".to_string()))
                .collect();
            assert_eq!(shown.len(), 3);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_orientation_and_device_info_text() {
        run_local(async {
            let rig = rig(calibrated_config());
            let task = start(&rig, MenuAction::Orientation);
            settle().await;
            let text = rig.ctx.hw.last_info().unwrap();
            assert!(text.starts_with("Compass "), "{text}");
            assert!(text.contains("\nClino "));
            click(&rig, Button::A);
            task.await.unwrap();

            let task = start(&rig, MenuAction::DeviceInfo);
            settle().await;
            let text = rig.ctx.hw.last_info().unwrap();
            assert!(text.starts_with("HW v6.1.0"), "{text}");
            assert!(text.contains("Battery 4.00V"));
            assert!(text.contains("Cal 0.000°"));
            click(&rig, Button::A);
            task.await.unwrap();
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_result_accept_and_discard() {
        run_local(async {
            let rig = rig(ConfigStore::default());
            let (shots, _) = standard_capture();
            let outcome = CalibrationEngine::new().calibrate(&Instrument::new().batch(&shots, 1)).unwrap();

            rig.ctx.set_calibration_result(Ok(outcome.clone()));
            let task = start(&rig, MenuAction::ShowCalibrationResult);
            settle().await;
            let text = rig.ctx.hw.last_info().unwrap();
            assert!(text.starts_with("Accuracy is "), "{text}");
            assert!(text.contains("This is excellent\nPress A to Save\nB to Discard"));
            click(&rig, Button::B);
            task.await.unwrap();
            assert!(rig.ctx.config.borrow().config().calibration.is_none());

            rig.ctx.set_calibration_result(Ok(outcome.clone()));
            let task = start(&rig, MenuAction::ShowCalibrationResult);
            settle().await;
            click(&rig, Button::A);
            task.await.unwrap();
            assert_eq!(rig.ctx.config.borrow().config().calibration, Some(outcome.model));
            assert!(rig.ctx.config.borrow().is_dirty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fit_leaves_model_alone() {
        run_local(async {
            let rig = rig(calibrated_config());
            let before = rig.ctx.config.borrow().config().calibration.clone();
            let failure = CalibrationEngine::new().calibrate(&Instrument::new().batch(&scattered_shots(30), 1));
            rig.ctx.set_calibration_result(failure);

            let task = start(&rig, MenuAction::ShowCalibrationResult);
            settle().await;
            assert!(rig.ctx.hw.last_info().unwrap().starts_with("Calibration\nfailed\n"));
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Sad]);
            click(&rig, Button::A);
            task.await.unwrap();
            assert_eq!(rig.ctx.config.borrow().config().calibration, before);
            assert!(!rig.ctx.config.borrow().is_dirty());
        })
        .await;
    }
}
