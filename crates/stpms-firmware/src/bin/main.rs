#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use esp_hal::clock::CpuClock;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::ble::controller::BleConnector;
use log::{error, info};
use static_cell::StaticCell;
use xtensa_lx_rt::exception::{Context, ExceptionCause};

use stpms_core::collaborators::Collaborators;
use stpms_core::fault::{Fatal, ProcessorFault, Subsystem, fail_fast};
use stpms_core::reading::ErrorFlags;
use stpms_core::signals::IsrFlags;
use stpms_core::{DutyCycle, ReadingAggregator, RetainedStore};
use stpms_firmware::board::{
    AdcBattery, HciAdvertiser, MainWatchdog, SleepController, SocReset, create_i2c_bus,
    hardware_reset_cause, init_sensor,
};
use stpms_firmware::{retained, settings};

static ISR_FLAGS: IsrFlags = IsrFlags::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    retained::record_reset_reason(Fatal::ProcessorFault(ProcessorFault::Panic).reset_reason());
    esp_hal::system::software_reset()
}

/// CPU exceptions: record the fault class, then reset.
#[unsafe(no_mangle)]
extern "C" fn __exception(cause: ExceptionCause, _context: &Context) {
    let fault = ProcessorFault::from_xtensa_cause(cause as u32);
    rtt_target::rprintln!("EXCEPTION: {:?} ({:?})", cause, fault);
    retained::record_reset_reason(Fatal::ProcessorFault(fault).reset_reason());
    esp_hal::system::software_reset()
}

/// Level 7 is the non-maskable interrupt on Xtensa.
#[unsafe(no_mangle)]
extern "C" fn __level_7_interrupt(_level: u32, _context: &Context) {
    rtt_target::rprintln!("NMI");
    retained::record_reset_reason(Fatal::ProcessorFault(ProcessorFault::Nmi).reset_reason());
    esp_hal::system::software_reset()
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz);
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    // ---- Retained state ----------------------------------------------------
    let config = settings::config();
    let Some(state) = retained::take() else {
        error!("Retained block already taken");
        esp_hal::system::software_reset()
    };
    let mut aggregator = ReadingAggregator::boot(
        RetainedStore::new(state),
        hardware_reset_cause(),
        &settings::BUILD,
        &config,
    );
    info!(
        "{} booted, reason {:?}",
        settings::BUILD,
        aggregator.boot_report().reason
    );

    let mut reset = SocReset;
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        fail_fast(
            aggregator.retained_mut(),
            &mut reset,
            Fatal::SubsystemInit(Subsystem::System),
        );
    }

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    let watchdog = MainWatchdog::start(timg1.wdt, config.watchdog_timeout_secs);

    // ---- Sensor ------------------------------------------------------------
    let bus = match create_i2c_bus(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9) {
        Ok(bus) => bus,
        Err(e) => {
            error!("I2C bus init failed: {:?}", e);
            fail_fast(
                aggregator.retained_mut(),
                &mut reset,
                Fatal::SubsystemInit(Subsystem::Bus),
            );
        }
    };
    let sensor = match init_sensor(bus) {
        Ok(sensor) => sensor,
        Err(e) => {
            error!("Sensor init failed: {}", e);
            fail_fast(
                aggregator.retained_mut(),
                &mut reset,
                Fatal::SubsystemInit(Subsystem::Sensor),
            );
        }
    };

    // ---- Radio -------------------------------------------------------------
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = match esp_radio::init() {
        Ok(controller) => RADIO.init(controller),
        Err(e) => {
            error!("Radio init failed: {:?}", e);
            fail_fast(
                aggregator.retained_mut(),
                &mut reset,
                Fatal::SubsystemInit(Subsystem::Radio),
            );
        }
    };
    let advertiser = match BleConnector::new(radio, peripherals.BT, Default::default())
        .map_err(|e| error!("BLE controller init failed: {:?}", e))
        .ok()
        .and_then(|hci| {
            HciAdvertiser::new(hci, &config)
                .map_err(|e| error!("Advertiser setup failed: {}", e))
                .ok()
        }) {
        Some(advertiser) => advertiser,
        None => fail_fast(
            aggregator.retained_mut(),
            &mut reset,
            Fatal::SubsystemInit(Subsystem::Radio),
        ),
    };

    // ---- Battery -----------------------------------------------------------
    let mut delay = esp_hal::delay::Delay::new();
    let mut battery = AdcBattery::new(peripherals.ADC1, peripherals.GPIO1);
    let boot_flags = if battery.probe(&mut delay, config.adc_ready_polls, config.poll_interval_ms) {
        ErrorFlags::NONE
    } else {
        ErrorFlags::ADC_INIT
    };

    // ---- Duty cycle --------------------------------------------------------
    let sleep = SleepController::new(Rtc::new(peripherals.LPWR), &ISR_FLAGS);
    let hw = Collaborators {
        sensor,
        battery,
        radio: advertiser,
        timer: &sleep,
        watchdog,
        power: &sleep,
        delay,
    };

    DutyCycle::new(config, aggregator, hw)
        .with_boot_flags(boot_flags)
        .run(&mut reset)
}
