//! Memory-mapped peripheral registers of the ATmega32.
//!
//! The transports never touch raw pointers themselves; they go through a
//! [`RegisterBlock`], which is [`Mmio`] on the chip and a simulated register
//! file in the host tests.

/// Data-space address of an 8-bit I/O register (I/O address + 0x20).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reg(pub u8);

// Two-wire interface
pub const TWBR: Reg = Reg(0x20);
pub const TWSR: Reg = Reg(0x21);
pub const TWDR: Reg = Reg(0x23);
pub const TWCR: Reg = Reg(0x56);

// USART
pub const UBRRL: Reg = Reg(0x29);
pub const UCSRB: Reg = Reg(0x2A);
pub const UCSRA: Reg = Reg(0x2B);
pub const UDR: Reg = Reg(0x2C);
/// UBRRH and UCSRC share one address; bit 7 (URSEL) picks the target.
pub const UBRRH: Reg = Reg(0x40);
pub const UCSRC: Reg = Reg(0x40);

// SPI
pub const SPCR: Reg = Reg(0x2D);
pub const SPSR: Reg = Reg(0x2E);
pub const SPDR: Reg = Reg(0x2F);

// GPIO ports
pub const PIND: Reg = Reg(0x30);
pub const DDRD: Reg = Reg(0x31);
pub const PORTD: Reg = Reg(0x32);
pub const PINC: Reg = Reg(0x33);
pub const DDRC: Reg = Reg(0x34);
pub const PORTC: Reg = Reg(0x35);
pub const PINB: Reg = Reg(0x36);
pub const DDRB: Reg = Reg(0x37);
pub const PORTB: Reg = Reg(0x38);

/// TWCR bits
pub mod twcr {
    pub const TWINT: u8 = 1 << 7;
    pub const TWEA: u8 = 1 << 6;
    pub const TWSTA: u8 = 1 << 5;
    pub const TWSTO: u8 = 1 << 4;
    pub const TWEN: u8 = 1 << 2;
}

/// SPCR / SPSR bits
pub mod spi {
    pub const SPE: u8 = 1 << 6;
    pub const DORD: u8 = 1 << 5;
    pub const MSTR: u8 = 1 << 4;
    pub const CPOL: u8 = 1 << 3;
    pub const CPHA: u8 = 1 << 2;
    pub const SPR1: u8 = 1 << 1;
    pub const SPR0: u8 = 1 << 0;
    pub const SPIF: u8 = 1 << 7;
    pub const SPI2X: u8 = 1 << 0;
}

/// UCSRA / UCSRB / UCSRC bits
pub mod usart {
    pub const RXC: u8 = 1 << 7;
    pub const UDRE: u8 = 1 << 5;
    pub const RXCIE: u8 = 1 << 7;
    pub const RXEN: u8 = 1 << 4;
    pub const TXEN: u8 = 1 << 3;
    pub const URSEL: u8 = 1 << 7;
    pub const UCSZ1: u8 = 1 << 2;
    pub const UCSZ0: u8 = 1 << 1;
}

/// Byte-wide access to the peripheral register file.
pub trait RegisterBlock {
    fn read(&self, reg: Reg) -> u8;

    fn write(&self, reg: Reg, value: u8);

    fn modify<F: FnOnce(u8) -> u8>(&self, reg: Reg, f: F) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    fn set_bits(&self, reg: Reg, mask: u8) {
        self.modify(reg, |v| v | mask);
    }

    fn clear_bits(&self, reg: Reg, mask: u8) {
        self.modify(reg, |v| v & !mask);
    }
}

impl<T: RegisterBlock + ?Sized> RegisterBlock for &T {
    fn read(&self, reg: Reg) -> u8 {
        (**self).read(reg)
    }

    fn write(&self, reg: Reg, value: u8) {
        (**self).write(reg, value)
    }
}

/// Volatile access to the real register file.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Only valid on an ATmega32 (or a part with the same I/O map). Every
    /// transport built on an `Mmio` assumes it is the sole user of the
    /// registers it touches.
    pub const unsafe fn new() -> Self {
        Mmio { _private: () }
    }
}

impl RegisterBlock for Mmio {
    fn read(&self, reg: Reg) -> u8 {
        // SAFETY: `reg` is one of the data-space addresses above, valid on the target.
        unsafe { core::ptr::read_volatile(reg.0 as usize as *const u8) }
    }

    fn write(&self, reg: Reg, value: u8) {
        // SAFETY: as in `read`.
        unsafe { core::ptr::write_volatile(reg.0 as usize as *mut u8, value) }
    }
}
