use libc::{c_int, c_void, off_t, size_t};
use std::{
  cell::Cell,
  ffi::CString,
  io,
  ptr::{read_volatile, write_volatile},
  sync::Mutex,
};

/// Number of GPIO controllers on the AM335x.
pub const CONTROLLER_COUNT: usize = 4;

/// Number of lines in one bank.
pub const BANK_WIDTH: usize = 32;

const GPIO_BASE_REGISTERS: [off_t; CONTROLLER_COUNT] =
  [0x44E0_7000, 0x4804_C000, 0x481A_C000, 0x481A_E000];
const GPIO_REGISTER_SIZE: size_t = 0xFFF;

const GPIO_OE_REGISTER: isize = 0x134;
const GPIO_DATAOUT_REGISTER: isize = 0x13C;
const GPIO_DATAIN_REGISTER: isize = 0x138;

/// A bank of up to 32 GPIO lines which is read and written as a whole.
///
/// Bit `n` of every mask or value corresponds to line `n` of the bank.
pub trait Bank {
  /// Changes the direction of the lines selected by `pins`. A set bit in
  /// `direction` makes the line an output, a cleared bit an input. Lines not
  /// selected by `pins` keep their direction.
  fn set_direction(&self, pins: u32, direction: u32);

  /// Reads the level of every line.
  ///
  /// Input lines always report their sampled level. Output lines report their
  /// latched output level when `with_output` is set, and zero otherwise.
  fn read(&self, with_output: bool) -> u32;

  /// Latches `value` onto the output lines. Bits of input lines are ignored.
  fn write(&self, value: u32);
}

impl<B: Bank + ?Sized> Bank for &B {
  fn set_direction(&self, pins: u32, direction: u32) {
    (**self).set_direction(pins, direction)
  }

  fn read(&self, with_output: bool) -> u32 {
    (**self).read(with_output)
  }

  fn write(&self, value: u32) {
    (**self).write(value)
  }
}

/// One memory-mapped GPIO controller of the AM335x.
pub struct Gpio {
  fd: c_int,
  base: Mutex<*mut c_void>,
  direction: Mutex<*mut u32>,
  dataout: Mutex<*mut u32>,
  datain: Mutex<*const u32>,
}

unsafe impl Sync for Gpio {}
unsafe impl Send for Gpio {}

impl Drop for Gpio {
  fn drop(&mut self) {
    let base = lock(&self.base);

    unsafe {
      libc::munmap(base, GPIO_REGISTER_SIZE);
      libc::close(self.fd);
    };
  }
}

impl Gpio {
  /// Maps the registers of controller `controller_index` (0 to 3) from
  /// `/dev/mem`.
  pub fn open_controller(controller_index: usize) -> io::Result<Gpio> {
    let Some(&offset) = GPIO_BASE_REGISTERS.get(controller_index) else {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no GPIO controller {controller_index}"),
      ));
    };

    let path = CString::new("/dev/mem")?;
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_SYNC) };

    if fd < 0 {
      return Err(io::Error::last_os_error());
    }

    // mmap hands back a virtual window onto the physical register block, so
    // every access below goes through the kernel's mapping.
    let base = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        GPIO_REGISTER_SIZE,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        offset,
      )
    };

    if base == libc::MAP_FAILED || base.is_null() {
      let error = io::Error::last_os_error();
      unsafe { libc::close(fd) };
      return Err(error);
    }

    // These are all pointers to actual 32 bit wide register addresses
    let direction =
      Mutex::new(unsafe { base.offset(GPIO_OE_REGISTER) as *mut u32 });

    let dataout =
      Mutex::new(unsafe { base.offset(GPIO_DATAOUT_REGISTER) as *mut u32 });

    let datain =
      Mutex::new(unsafe { base.offset(GPIO_DATAIN_REGISTER) as *const u32 });

    Ok(Gpio {
      fd,
      base: Mutex::new(base),
      direction,
      dataout,
      datain,
    })
  }

  // The output-enable register is active low: a cleared bit is an output.
  fn output_mask(&self) -> u32 {
    let direction = lock(&self.direction);
    !unsafe { read_volatile(direction) }
  }
}

fn lock<T: Copy>(register: &Mutex<T>) -> T {
  match register.lock() {
    Ok(pointer) => *pointer,
    Err(poisoned) => *poisoned.into_inner(),
  }
}

impl Bank for Gpio {
  fn set_direction(&self, pins: u32, direction: u32) {
    let register = lock(&self.direction);
    let mut oe_bits = unsafe { read_volatile(register) };

    oe_bits &= !(pins & direction);
    oe_bits |= pins & !direction;

    unsafe { write_volatile(register, oe_bits) };
  }

  fn read(&self, with_output: bool) -> u32 {
    let outputs = self.output_mask();
    let datain_bits = unsafe { read_volatile(lock(&self.datain)) };
    let mut value = datain_bits & !outputs;

    if with_output {
      let dataout_bits = unsafe { read_volatile(lock(&self.dataout).cast_const()) };
      value |= dataout_bits & outputs;
    }

    value
  }

  fn write(&self, value: u32) {
    let outputs = self.output_mask();
    let register = lock(&self.dataout);
    let dataout_bits = unsafe { read_volatile(register) };

    let dataout_bits = (dataout_bits & !outputs) | (value & outputs);

    unsafe { write_volatile(register, dataout_bits) };
  }
}

/// A single GPIO line driven as a digital output.
pub struct OutputPin<B: Bank> {
  bank: B,
  index: usize,
}

impl<B: Bank> OutputPin<B> {
  /// Claims line `index` of `bank` and switches it to an output. Fails
  /// without touching the bank when the bank has no such line.
  pub fn new(bank: B, index: usize) -> io::Result<OutputPin<B>> {
    if index >= BANK_WIDTH {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no GPIO line {index} in a bank of {BANK_WIDTH}"),
      ));
    }

    let pin = OutputPin { bank, index };
    pin.bank.set_direction(pin.mask(), pin.mask());
    Ok(pin)
  }

  /// The bit of this pin within its bank.
  pub fn mask(&self) -> u32 {
    1 << self.index
  }

  /// Drives the pin high when `value` is set, low otherwise. The other lines
  /// of the bank are written back unchanged.
  pub fn set_output(&mut self, value: bool) {
    let combined = self.bank.read(true);

    let combined = if value {
      combined | self.mask()
    } else {
      combined & !self.mask()
    };

    self.bank.write(combined);
  }

  /// Returns `true` while the pin is driven high.
  pub fn get_output(&self) -> bool {
    self.bank.read(true) & self.mask() != 0
  }

  /// Inverts the pin.
  pub fn toggle(&mut self) {
    let value = !self.get_output();
    self.set_output(value);
  }
}

/// An in-memory bank, for running pin logic without hardware.
#[derive(Debug, Default)]
pub struct VirtualBank {
  outputs: Cell<u32>,
  dataout: Cell<u32>,
  datain: Cell<u32>,
}

impl VirtualBank {
  /// Sets the level seen on the input lines.
  pub fn drive_inputs(&self, value: u32) {
    self.datain.set(value);
  }

  /// Returns the mask of lines configured as outputs.
  pub fn outputs(&self) -> u32 {
    self.outputs.get()
  }
}

impl Bank for VirtualBank {
  fn set_direction(&self, pins: u32, direction: u32) {
    let outputs = (self.outputs.get() & !pins) | (pins & direction);
    self.outputs.set(outputs);
  }

  fn read(&self, with_output: bool) -> u32 {
    let outputs = self.outputs.get();
    let mut value = self.datain.get() & !outputs;

    if with_output {
      value |= self.dataout.get() & outputs;
    }

    value
  }

  fn write(&self, value: u32) {
    let outputs = self.outputs.get();
    self.dataout.set((self.dataout.get() & !outputs) | (value & outputs));
  }
}
