use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use x86_64::instructions::port::Port;

/// I/O base of the first UART.
const COM1: u16 = 0x3F8;

/// Line status bit: transmit holding register empty.
const LSR_THR_EMPTY: u8 = 0x20;

/// 16550 UART driven by port I/O, used only for kernel log output.
pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_sts: Port<u8>,
}

impl SerialPort {
    /// # Safety
    /// `base` must be the I/O base of a 16550 that nothing else drives.
    pub const unsafe fn new(base: u16) -> SerialPort {
        SerialPort {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    /// 38400 baud, 8N1, FIFOs on, no UART interrupts.
    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            // DLAB on, divisor 3.
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_en.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
    }

    pub fn send(&mut self, byte: u8) {
        unsafe {
            while self.line_sts.read() & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.data.write(byte);
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.send(b'\r');
            }
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(COM1) };
        port.init();
        Mutex::new(port)
    };
}

/// `log` backend writing one `[LEVEL] message` line per record to COM1.
struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        use core::fmt::Write;
        // Lines from other CPUs must not interleave, and an interrupt on
        // this CPU must not try to take the port lock we hold.
        crate::scheduler::without_interrupts(|| {
            let mut port = SERIAL1.lock();
            let _ = writeln!(port, "[{}] {}", record.level(), record.args());
        });
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Route the `log` macros to the serial port.
pub fn init(level: LevelFilter) {
    let _ = SERIAL1.lock();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
