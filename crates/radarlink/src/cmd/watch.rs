use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use radarlink_device::{DeviceError, Drain};

use tracing::{debug, warn};

use crate::cmd::sensor::Sensor;
use crate::cmd::{parse_timeout, WatchArgs};
use crate::exit::{device_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_reading, OutputFormat, Reading};

/// Consecutive failed polls tolerated before giving up.
const MAX_MISSES: u32 = 10;

/// What to do after a poll failed.
#[derive(Debug, PartialEq, Eq)]
enum Miss {
    Retry,
    Exhausted,
    Fatal,
}

/// Count of consecutive polls that produced no usable frame.
#[derive(Debug, Default)]
struct Misses(u32);

impl Misses {
    /// Timeouts and unreadable frames both count toward [`MAX_MISSES`];
    /// any other failure ends the watch at once.
    fn record(&mut self, err: &DeviceError) -> Miss {
        if !err.is_timeout() && !err.class().is_transient() {
            return Miss::Fatal;
        }
        self.0 += 1;
        if self.0 >= MAX_MISSES {
            Miss::Exhausted
        } else {
            Miss::Retry
        }
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let idle = parse_timeout(&args.port.timeout)?;
    let mut sensor = Sensor::open(&args.port)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut seq = 0u64;
    let mut misses = Misses::default();

    while running.load(Ordering::SeqCst) {
        let result = match &mut sensor {
            Sensor::Binary(s) => s
                .try_read_frame(args.attempts, false, args.drain)
                .map(Reading::Report),
            Sensor::Ascii(s) => s
                .try_read_frame(args.attempts, false, args.drain)
                .map(Reading::Presence),
        };

        let reading = match result {
            Ok(reading) => reading,
            Err(err) => match misses.record(&err) {
                Miss::Retry => {
                    if err.is_timeout() {
                        debug!(misses = misses.0, "no telemetry frame");
                    } else {
                        warn!(error = %err, misses = misses.0, "dropping unreadable frame");
                    }
                    if args.drain == Drain::Only || !err.is_timeout() {
                        // These return without waiting; pace the loop ourselves.
                        thread::sleep(idle);
                    }
                    continue;
                }
                Miss::Exhausted if err.is_timeout() => {
                    return Err(device_error("no telemetry", err))
                }
                Miss::Exhausted => return Err(device_error("telemetry unreadable", err)),
                Miss::Fatal => return Err(device_error("watch failed", err)),
            },
        };

        misses.reset();
        seq += 1;
        print_reading(seq, &reading, format);

        if args.count.is_some_and(|count| seq >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
