//! Transport layer for card communication
//!
//! A transport is the externally provided channel that carries command
//! APDUs to a card. Delivery is assumed reliable and in-order, and a
//! response always arrives complete: body and status word together, never
//! in parts. A transport has exactly one owner at a time; the protocol
//! layers above issue strictly sequential exchanges and never re-enter
//! while a command is outstanding.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::Error;

/// A reliable, in-order channel to a card
pub trait CardTransport: fmt::Debug {
    /// Exchange one APDU: submit the command bytes and block until the
    /// complete response (body followed by SW1 and SW2) is available
    fn transmit(&mut self, command: &[u8]) -> Result<Bytes, Error>;

    /// Reset the underlying channel, discarding any card-side session state
    fn reset(&mut self) -> Result<(), Error>;
}

/// Passive observer of APDU exchanges
///
/// Observers are notified with the raw command bytes, the raw response bytes,
/// and the time the exchange took, strictly in send order. Observers must not
/// issue card commands of their own.
pub trait ExchangeObserver {
    /// Called once per APDU exchange, after the response has been received
    fn on_exchange(&self, command: &[u8], response: &[u8], elapsed: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct EchoTransport;

    impl CardTransport for EchoTransport {
        fn transmit(&mut self, command: &[u8]) -> Result<Bytes, Error> {
            let mut response = command.to_vec();
            response.extend_from_slice(&[0x90, 0x00]);
            Ok(Bytes::from(response))
        }

        fn reset(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    struct CountingObserver {
        exchanges: Mutex<usize>,
    }

    impl ExchangeObserver for CountingObserver {
        fn on_exchange(&self, _command: &[u8], _response: &[u8], _elapsed: Duration) {
            *self.exchanges.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_transport_object_safety() {
        let mut transport: Box<dyn CardTransport> = Box::new(EchoTransport);
        let response = transport.transmit(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert_eq!(response.as_ref(), &[0x00, 0xA4, 0x04, 0x00, 0x90, 0x00]);
    }

    #[test]
    fn test_observer_object_safety() {
        let observer: Box<dyn ExchangeObserver> = Box::new(CountingObserver {
            exchanges: Mutex::new(0),
        });
        observer.on_exchange(&[0x00], &[0x90, 0x00], Duration::from_millis(1));
    }
}
