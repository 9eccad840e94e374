use embedded_hal::digital::{InputPin, OutputPin};
use log::{info, warn};

use polycv::autotune::AutotuneEvent;
use polycv::controls::{AnalogInput, ControlScanner};
use polycv::midi::MidiFramer;
use polycv::outputs::{CvSink, Dco, OscRouter};
use polycv::storage::NvStorage;
use polycv::util::elapsed_ms;
use polycv::{Autotune, Engine};

/// Hold the autotune button this long to start a sweep
const BUTTON_HOLD_MS: u32 = 50;

/// Everything the control loop drives
pub struct Board<CV, DCO, ROUTE, NV, P, A, BTN, LED> {
    pub cv: CV,
    pub dco: DCO,
    pub router: ROUTE,
    pub storage: NV,
    pub scanner: ControlScanner<P, A>,
    pub button: BTN,
    pub led: LED,
}

/// The control loop.  `read_midi` fills a buffer with whatever the MIDI UART
/// has received and returns how many bytes it wrote; `now_ms` is a free
/// running millisecond clock.
pub fn run<CV, DCO, ROUTE, NV, P, A, BTN, LED>(
    mut engine: Engine,
    mut board: Board<CV, DCO, ROUTE, NV, P, A, BTN, LED>,
    mut read_midi: impl FnMut(&mut [u8]) -> usize,
    now_ms: impl Fn() -> u32,
) -> !
where
    CV: CvSink,
    CV::Error: core::fmt::Debug,
    DCO: Dco,
    DCO::Error: core::fmt::Debug,
    ROUTE: OscRouter,
    ROUTE::Error: core::fmt::Debug,
    NV: NvStorage,
    NV::Error: core::fmt::Debug,
    P: OutputPin,
    P::Error: core::fmt::Debug,
    A: AnalogInput,
    A::Error: core::fmt::Debug,
    BTN: InputPin,
    LED: OutputPin,
{
    let mut autotune = Autotune::new(engine.config().autotune);
    let mut framer = MidiFramer::new();
    let mut midi_buf = [0u8; 16];
    // when the button went down, and whether that press has been acted on
    let mut pressed: Option<(u32, bool)> = None;

    // holding the button at power on clears the tuning
    if board.button.is_low().unwrap_or(false) {
        info!("clearing calibration");
        engine.reset_calibration();
        if let Err(e) = engine.calibration().store(&mut board.storage) {
            warn!("could not store calibration: {:?}", e);
        }
        while board.button.is_low().unwrap_or(false) {}
    }

    loop {
        let now = now_ms();

        let received = read_midi(&mut midi_buf);
        framer.push_all(&midi_buf[..received], |msg| {
            engine.handle_midi(&msg);
        });

        match board.scanner.poll() {
            Ok(Some(change)) => engine.apply_control(change),
            Ok(None) => {}
            Err(e) => warn!("control scan: {:?}", e),
        }

        match (board.button.is_low().unwrap_or(false), pressed) {
            (true, None) => pressed = Some((now, false)),
            (true, Some((since, false))) if elapsed_ms(now, since) >= BUTTON_HOLD_MS => {
                pressed = Some((since, true));
                if autotune.is_running() {
                    autotune.abort();
                } else {
                    autotune.start_all();
                    let _ = board.led.set_high();
                }
            }
            (false, _) => pressed = None,
            _ => {}
        }

        if autotune.is_running() {
            match autotune.poll(
                now,
                &mut board.dco,
                &mut board.router,
                &crate::CAPTURE,
                engine.calibration_mut(),
            ) {
                Ok(Some(AutotuneEvent::Applied { osc, note, .. })) => {
                    if let Err(e) = engine.calibration().store_entry(osc, note, &mut board.storage) {
                        warn!("could not store calibration: {:?}", e);
                    }
                }
                Ok(Some(AutotuneEvent::Finished)) => {
                    engine.invalidate_outputs();
                    let _ = board.led.set_low();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("autotune: {:?}", e);
                    autotune.abort();
                    engine.invalidate_outputs();
                    let _ = board.led.set_low();
                }
            }
            if let Err(e) = engine.render_cv(now, &mut board.cv) {
                warn!("cv outputs: {:?}", e);
            }
        } else if let Err(e) = engine.render(now, &mut board.cv, &mut board.dco) {
            warn!("outputs: {:?}", e);
        }
    }
}
