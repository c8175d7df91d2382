/// Single-byte commands understood by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read,
}

impl Command {
    pub const READ_BYTE: u8 = b'r';

    /// `None` for any byte that is not a command.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::READ_BYTE => Some(Self::Read),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Self::Read => Self::READ_BYTE,
        }
    }
}
