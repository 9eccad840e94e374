#![no_std]
#![no_main]

use panic_halt as _;
use rp_pico::entry;
use rp_pico::hal::{self, gpio, pac, pac::interrupt, Clock};

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal_bus::{i2c as i2c_bus, spi as spi_bus};
use hal::fugit::RateExtU32;
use log::warn;

use polycv::ad9833::Ad9833Array;
use polycv::controls::{ControlScanner, Mux};
use polycv::storage::Settings;
use polycv::{BoardConfig, CalibrationTable, Engine, FrequencyCapture};

mod board;
mod run;

const CONFIG: BoardConfig = BoardConfig::new();

const GATES_ADDRESS: u8 = 0x20;
const ROUTE_ADDRESS: u8 = 0x21;
const EEPROM_ADDRESS: u8 = 0x50;

/// Edges of the oscillator under test, timestamped by the IO interrupt
static CAPTURE: FrequencyCapture = FrequencyCapture::new(CONFIG.capture);

type CounterPin = gpio::Pin<gpio::bank0::Gpio16, gpio::FunctionSioInput, gpio::PullNone>;

static COUNTER: Mutex<RefCell<Option<(CounterPin, hal::Timer)>>> =
    Mutex::new(RefCell::new(None));

#[entry]
fn start() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();
    let sio = hal::Sio::new(pac.SIO);
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let pins = rp_pico::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // MIDI in
    let uart_pins = (
        pins.gpio0.into_function::<gpio::FunctionUart>(),
        pins.gpio1.into_function::<gpio::FunctionUart>(),
    );
    let mut uart = hal::uart::UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS)
        .enable(
            hal::uart::UartConfig::new(
                polycv::midi::BAUD_RATE.Hz(),
                hal::uart::DataBits::Eight,
                None,
                hal::uart::StopBits::One,
            ),
            clocks.peripheral_clock.freq(),
        )
        .unwrap();

    // DDS chips: SPI0 in mode 2, one FSYNC each
    let dds_spi = hal::spi::Spi::<_, _, _, 16>::new(
        pac.SPI0,
        (
            pins.gpio19.into_function::<gpio::FunctionSpi>(),
            pins.gpio18.into_function::<gpio::FunctionSpi>(),
        ),
    )
    .init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        25.MHz(),
        embedded_hal::spi::MODE_2,
    );
    let dds_bus = RefCell::new(dds_spi);
    let fsync = [
        pins.gpio2.into_push_pull_output().into_dyn_pin(),
        pins.gpio3.into_push_pull_output().into_dyn_pin(),
        pins.gpio4.into_push_pull_output().into_dyn_pin(),
        pins.gpio5.into_push_pull_output().into_dyn_pin(),
        pins.gpio6.into_push_pull_output().into_dyn_pin(),
        pins.gpio7.into_push_pull_output().into_dyn_pin(),
        pins.gpio8.into_push_pull_output().into_dyn_pin(),
        pins.gpio9.into_push_pull_output().into_dyn_pin(),
    ];
    let mut dds = Ad9833Array::new(
        fsync.map(|pin| spi_bus::RefCellDevice::new(&dds_bus, pin, timer).unwrap()),
        timer,
        CONFIG.mclk_hz,
    );
    if let Err(e) = dds.reset_all() {
        warn!("dds reset: {:?}", e);
    }

    // DACs: SPI1 in mode 1, one CS each
    let dac_spi = hal::spi::Spi::<_, _, _, 16>::new(
        pac.SPI1,
        (
            pins.gpio11.into_function::<gpio::FunctionSpi>(),
            pins.gpio10.into_function::<gpio::FunctionSpi>(),
        ),
    )
    .init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        20.MHz(),
        embedded_hal::spi::MODE_1,
    );
    let dac_bus = RefCell::new(dac_spi);
    let [notes, velocities, modulation] = [
        pins.gpio12.into_push_pull_output().into_dyn_pin(),
        pins.gpio13.into_push_pull_output().into_dyn_pin(),
        pins.gpio14.into_push_pull_output().into_dyn_pin(),
    ]
    .map(|cs| {
        let device = spi_bus::RefCellDevice::new(&dac_bus, cs, timer).unwrap();
        board::Dac8568::new(device).unwrap()
    });

    // I2C: gate expander, autotune mux expander, EEPROM
    let sda: gpio::Pin<_, gpio::FunctionI2C, gpio::PullUp> = pins.gpio20.reconfigure();
    let scl: gpio::Pin<_, gpio::FunctionI2C, gpio::PullUp> = pins.gpio21.reconfigure();
    let i2c = hal::I2C::i2c0(
        pac.I2C0,
        sda,
        scl,
        400.kHz(),
        &mut pac.RESETS,
        &clocks.system_clock,
    );
    let i2c_bus = RefCell::new(i2c);
    let gates =
        board::Mcp23017::new(i2c_bus::RefCellDevice::new(&i2c_bus), GATES_ADDRESS, (0, 0)).unwrap();
    let router = board::RouteMux::new(i2c_bus::RefCellDevice::new(&i2c_bus), ROUTE_ADDRESS).unwrap();
    let mut storage =
        board::Eeprom24::new(i2c_bus::RefCellDevice::new(&i2c_bus), timer, EEPROM_ADDRESS);

    // control pots
    let mux = Mux::new([
        pins.gpio17.into_push_pull_output().into_dyn_pin(),
        pins.gpio22.into_push_pull_output().into_dyn_pin(),
        pins.gpio27.into_push_pull_output().into_dyn_pin(),
    ])
    .unwrap();
    let adc = hal::Adc::new(pac.ADC, &mut pac.RESETS);
    let adc_pin = hal::adc::AdcPin::new(pins.gpio26.into_floating_input()).unwrap();
    let scanner = ControlScanner::new(mux, board::ControlAdc::new(adc, adc_pin));

    // frequency counter input
    let mut counter: CounterPin = pins.gpio16.reconfigure();
    counter.set_interrupt_enabled(gpio::Interrupt::EdgeHigh, true);
    critical_section::with(|cs| COUNTER.borrow(cs).replace(Some((counter, timer))));
    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0);
    }

    let settings = Settings::load(&mut storage).unwrap_or_else(|e| {
        warn!("could not load settings: {:?}", e);
        Settings::default()
    });
    let calibration = CalibrationTable::load(&mut storage).unwrap_or_else(|e| {
        warn!("could not load calibration: {:?}", e);
        CalibrationTable::default()
    });
    let engine = Engine::new(CONFIG, settings, calibration);

    let board = run::Board {
        cv: board::CvOutputs::new(notes, velocities, modulation, gates),
        dco: dds,
        router,
        storage,
        scanner,
        button: pins.gpio15.into_pull_up_input(),
        led: pins.led.into_push_pull_output(),
    };
    run::run(
        engine,
        board,
        move |buf| {
            if uart.uart_is_readable() {
                uart.read_raw(buf).unwrap_or(0)
            } else {
                0
            }
        },
        move || (timer.get_counter().ticks() / 1000) as u32,
    )
}

#[interrupt]
fn IO_IRQ_BANK0() {
    critical_section::with(|cs| {
        if let Some((pin, timer)) = COUNTER.borrow_ref_mut(cs).as_mut() {
            if pin.interrupt_status(gpio::Interrupt::EdgeHigh) {
                CAPTURE.on_edge(timer.get_counter_low());
                pin.clear_interrupt(gpio::Interrupt::EdgeHigh);
            }
        }
    });
}
