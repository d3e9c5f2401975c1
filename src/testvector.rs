//! Test vectors: fixed-width, 3-valued bit vectors over a network's PPIs.

use rand::Rng;
use std::fmt;

use crate::fault::FaultType;
use crate::val3::Val3;

/// A PPI assignment produced by justification and consumed by the fault
/// simulator.
///
/// In stuck-at mode this is a plain `ppi_num`-bit vector. In
/// transition-delay mode it is `ppi_num + input_num` bits: the first
/// `ppi_num` bits are the previous-time-frame value of every PPI (the state
/// the circuit is launched from), and the remaining `input_num` bits are
/// the launch-time value driven onto the true primary inputs only, since
/// DFF outputs at launch time are determined by the previous frame, not
/// driven directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestVector {
    fault_type: FaultType,
    ppi_num: usize,
    input_num: usize,
    bits: Vec<Val3>,
}

impl TestVector {
    pub fn new_stuck_at(ppi_num: usize) -> TestVector {
        TestVector {
            fault_type: FaultType::StuckAt,
            ppi_num,
            input_num: 0,
            bits: vec![Val3::X; ppi_num],
        }
    }

    pub fn new_transition_delay(ppi_num: usize, input_num: usize) -> TestVector {
        TestVector {
            fault_type: FaultType::TransitionDelay,
            ppi_num,
            input_num,
            bits: vec![Val3::X; ppi_num + input_num],
        }
    }

    pub fn fault_type(&self) -> FaultType {
        self.fault_type
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn get(&self, pos: usize) -> Val3 {
        self.bits[pos]
    }

    pub fn set(&mut self, pos: usize, v: Val3) {
        self.bits[pos] = v;
    }

    /// The value of PPI `idx` in the frame the fault is launched from: the
    /// current frame in stuck-at mode, the previous frame in
    /// transition-delay mode.
    pub fn ppi_base(&self, idx: usize) -> Val3 {
        self.bits[idx]
    }

    /// The value driving true primary input `idx` at launch time.
    /// Transition-delay only; stuck-at has no separate launch frame.
    pub fn launch_input(&self, idx: usize) -> Val3 {
        assert_eq!(self.fault_type, FaultType::TransitionDelay);
        self.bits[self.ppi_num + idx]
    }

    pub fn set_launch_input(&mut self, idx: usize, v: Val3) {
        assert_eq!(self.fault_type, FaultType::TransitionDelay);
        self.bits[self.ppi_num + idx] = v;
    }

    /// One character per bit, leftmost = position 0.
    pub fn bin_str(&self) -> String {
        self.bits.iter().map(|b| b.to_string()).collect()
    }

    /// Four bits per nibble, big-endian within the nibble. Panics if any
    /// bit is `X`, since a hex digit cannot represent "don't care".
    pub fn hex_str(&self) -> String {
        let mut s = String::with_capacity((self.bits.len() + 3) / 4);
        for chunk in self.bits.chunks(4) {
            let mut nibble = 0u8;
            for (i, b) in chunk.iter().enumerate() {
                if b.to_bool() {
                    nibble |= 1 << (3 - i);
                }
            }
            s.push(std::char::from_digit(nibble as u32, 16).unwrap());
        }
        s
    }

    /// Reads the same big-endian-nibble encoding `hex_str` produces,
    /// padding with `0` if `hex` is short and truncating if it is long.
    pub fn set_from_hex(&mut self, hex: &str) {
        let mut pos = 0;
        for c in hex.chars() {
            if pos >= self.bits.len() {
                break;
            }
            let nibble = c.to_digit(16).expect("invalid hex digit") as u8;
            for i in 0..4 {
                if pos >= self.bits.len() {
                    break;
                }
                let bit = (nibble >> (3 - i)) & 1 != 0;
                self.bits[pos] = Val3::from_bool(bit);
                pos += 1;
            }
        }
        while pos < self.bits.len() {
            self.bits[pos] = Val3::Zero;
            pos += 1;
        }
    }

    /// Replaces every `X` bit with a uniformly random 0/1, for callers that
    /// want a fully-specified pattern rather than the minimal one
    /// justification produced.
    pub fn fill_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for b in self.bits.iter_mut() {
            if *b == Val3::X {
                *b = Val3::from_bool(rng.gen());
            }
        }
    }
}

impl fmt::Display for TestVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bin_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_bin_str_roundtrip() {
        let mut tv = TestVector::new_stuck_at(4);
        tv.set(0, Val3::Zero);
        tv.set(1, Val3::One);
        tv.set(2, Val3::X);
        tv.set(3, Val3::One);
        assert_eq!(tv.bin_str(), "01X1");
    }

    #[test]
    fn test_hex_roundtrip() {
        let mut tv = TestVector::new_stuck_at(8);
        for (i, v) in [1, 0, 1, 1, 0, 0, 1, 0].into_iter().enumerate() {
            tv.set(i, Val3::from_bool(v == 1));
        }
        let hex = tv.hex_str();
        let mut tv2 = TestVector::new_stuck_at(8);
        tv2.set_from_hex(&hex);
        assert_eq!(tv, tv2);
    }

    #[test]
    fn test_set_from_hex_pads_and_truncates() {
        let mut tv = TestVector::new_stuck_at(12);
        tv.set_from_hex("f"); // short: pads remaining bits with 0
        assert_eq!(tv.bin_str(), "1111" .to_string() + &"0".repeat(8));

        let mut tv2 = TestVector::new_stuck_at(4);
        tv2.set_from_hex("ff"); // long: truncates
        assert_eq!(tv2.bin_str(), "1111");
    }

    #[test]
    fn test_fill_random_only_touches_x() {
        let mut tv = TestVector::new_stuck_at(3);
        tv.set(0, Val3::Zero);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
        tv.fill_random(&mut rng);
        assert_eq!(tv.get(0), Val3::Zero);
        assert!(tv.get(1).is_defined());
        assert!(tv.get(2).is_defined());
    }

    #[test]
    fn test_transition_delay_layout() {
        let mut tv = TestVector::new_transition_delay(3, 2);
        assert_eq!(tv.width(), 5);
        tv.set_launch_input(0, Val3::One);
        assert_eq!(tv.launch_input(0), Val3::One);
        assert_eq!(tv.ppi_base(0), Val3::X);
    }
}
