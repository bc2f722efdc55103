//! USART in 8N1 mode with a software receive queue.
//!
//! Received bytes land in a 64-byte FIFO, filled either from the RXC
//! interrupt (`on_receive`) or by polling (`poll`). When the queue is full
//! new bytes are dropped.

use core::convert::Infallible;

use heapless::Deque;

use super::registers::{usart, RegisterBlock, UBRRH, UBRRL, UCSRA, UCSRB, UCSRC, UDR};

pub const RX_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartConfig {
    pub cpu_frequency: u32,
    pub baudrate: u32,
}

impl Default for UsartConfig {
    fn default() -> Self {
        Self {
            cpu_frequency: 12_000_000,
            baudrate: 9600,
        }
    }
}

impl UsartConfig {
    /// UBRR value for normal-speed asynchronous mode, clamped to 12 bits.
    pub fn ubrr(&self) -> u16 {
        let divider = self
            .cpu_frequency
            .checked_div(16 * self.baudrate.max(1))
            .unwrap_or(0);
        divider.saturating_sub(1).min(0x0FFF) as u16
    }
}

pub struct Usart<R> {
    regs: R,
    rx: Deque<u8, RX_QUEUE_SIZE>,
}

impl<R: RegisterBlock> Usart<R> {
    pub fn new(regs: R, config: UsartConfig) -> Self {
        let ubrr = config.ubrr();

        // URSEL clear: this write goes to UBRRH
        regs.write(UBRRH, ((ubrr >> 8) as u8) & 0x0F);
        regs.write(UBRRL, ubrr as u8);
        regs.write(UCSRB, usart::RXEN | usart::TXEN | usart::RXCIE);
        regs.write(UCSRC, usart::URSEL | usart::UCSZ1 | usart::UCSZ0);

        crate::log_debug!("USART up: {} baud, UBRR {}", config.baudrate, ubrr);

        Usart {
            regs,
            rx: Deque::new(),
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        while self.regs.read(UCSRA) & usart::UDRE == 0 {}
        self.regs.write(UDR, byte);
    }

    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    /// Body of the RXC interrupt: moves the byte from UDR into the queue.
    pub fn on_receive(&mut self) {
        let byte = self.regs.read(UDR);
        if self.rx.push_back(byte).is_err() {
            crate::log_debug!("USART receive queue full, dropped {}", byte);
        }
    }

    /// Drains the hardware receive buffer without interrupts.
    pub fn poll(&mut self) {
        while self.regs.read(UCSRA) & usart::RXC != 0 {
            self.on_receive();
        }
    }

    pub fn data_available(&self) -> bool {
        !self.rx.is_empty()
    }

    pub fn available(&self) -> usize {
        self.rx.len()
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    /// Moves up to `buf.len()` queued bytes, oldest first.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.rx.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Discards everything in the receive queue.
    pub fn flush(&mut self) {
        self.rx.clear();
    }
}

impl<R: RegisterBlock> embedded_io::ErrorType for Usart<R> {
    type Error = Infallible;
}

impl<R: RegisterBlock> embedded_io::Write for Usart<R> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            self.write_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<R: RegisterBlock> embedded_io::Read for Usart<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.data_available() {
            self.poll();
        }
        Ok(self.read_into(buf))
    }
}
