//! Michelson primitive table
//!
//! Every primitive known to the binary and JSON encodings, with its stable
//! one-byte tag and canonical text name. The table is static data: lookups by
//! byte index the table directly, lookups by name compile to a string match.

use crate::error::{MichelineError, Result};
use std::fmt;
use std::str::FromStr;

macro_rules! opcodes {
    ($($name:ident = $byte:literal,)*) => {
        /// A Michelson primitive (keyword, type, data constructor or instruction)
        ///
        /// Variant names are the canonical Michelson spelling, so `Pair` (data),
        /// `pair` (type) and `PAIR` (instruction) are distinct primitives.
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $byte,)*
        }

        /// All primitives ordered by their binary tag
        pub const OPCODES: &[OpCode] = &[$(OpCode::$name,)*];

        impl OpCode {
            /// Canonical text name used by the JSON encoding
            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name),)*
                }
            }

            /// Parse a primitive name; matching is exact and case sensitive
            pub fn parse(name: &str) -> Result<Self> {
                match name {
                    $(stringify!($name) => Ok(OpCode::$name),)*
                    _ => Err(MichelineError::UnknownPrimitive(name.to_string())),
                }
            }
        }
    };
}

opcodes! {
    parameter = 0x00,
    storage = 0x01,
    code = 0x02,
    False = 0x03,
    Elt = 0x04,
    Left = 0x05,
    None = 0x06,
    Pair = 0x07,
    Right = 0x08,
    Some = 0x09,
    True = 0x0A,
    Unit = 0x0B,
    PACK = 0x0C,
    UNPACK = 0x0D,
    BLAKE2B = 0x0E,
    SHA256 = 0x0F,
    SHA512 = 0x10,
    ABS = 0x11,
    ADD = 0x12,
    AMOUNT = 0x13,
    AND = 0x14,
    BALANCE = 0x15,
    CAR = 0x16,
    CDR = 0x17,
    CHECK_SIGNATURE = 0x18,
    COMPARE = 0x19,
    CONCAT = 0x1A,
    CONS = 0x1B,
    CREATE_ACCOUNT = 0x1C,
    CREATE_CONTRACT = 0x1D,
    IMPLICIT_ACCOUNT = 0x1E,
    DIP = 0x1F,
    DROP = 0x20,
    DUP = 0x21,
    EDIV = 0x22,
    EMPTY_MAP = 0x23,
    EMPTY_SET = 0x24,
    EQ = 0x25,
    EXEC = 0x26,
    FAILWITH = 0x27,
    GE = 0x28,
    GET = 0x29,
    GT = 0x2A,
    HASH_KEY = 0x2B,
    IF = 0x2C,
    IF_CONS = 0x2D,
    IF_LEFT = 0x2E,
    IF_NONE = 0x2F,
    INT = 0x30,
    LAMBDA = 0x31,
    LE = 0x32,
    LEFT = 0x33,
    LOOP = 0x34,
    LSL = 0x35,
    LSR = 0x36,
    LT = 0x37,
    MAP = 0x38,
    MEM = 0x39,
    MUL = 0x3A,
    NEG = 0x3B,
    NEQ = 0x3C,
    NIL = 0x3D,
    NONE = 0x3E,
    NOT = 0x3F,
    NOW = 0x40,
    OR = 0x41,
    PAIR = 0x42,
    PUSH = 0x43,
    RIGHT = 0x44,
    SIZE = 0x45,
    SOME = 0x46,
    SOURCE = 0x47,
    SENDER = 0x48,
    SELF = 0x49,
    STEPS_TO_QUOTA = 0x4A,
    SUB = 0x4B,
    SWAP = 0x4C,
    TRANSFER_TOKENS = 0x4D,
    SET_DELEGATE = 0x4E,
    UNIT = 0x4F,
    UPDATE = 0x50,
    XOR = 0x51,
    ITER = 0x52,
    LOOP_LEFT = 0x53,
    ADDRESS = 0x54,
    CONTRACT = 0x55,
    ISNAT = 0x56,
    CAST = 0x57,
    RENAME = 0x58,
    bool = 0x59,
    contract = 0x5A,
    int = 0x5B,
    key = 0x5C,
    key_hash = 0x5D,
    lambda = 0x5E,
    list = 0x5F,
    map = 0x60,
    big_map = 0x61,
    nat = 0x62,
    option = 0x63,
    or = 0x64,
    pair = 0x65,
    set = 0x66,
    signature = 0x67,
    string = 0x68,
    bytes = 0x69,
    mutez = 0x6A,
    timestamp = 0x6B,
    unit = 0x6C,
    operation = 0x6D,
    address = 0x6E,
    SLICE = 0x6F,
    DIG = 0x70,
    DUG = 0x71,
    EMPTY_BIG_MAP = 0x72,
    APPLY = 0x73,
    chain_id = 0x74,
    CHAIN_ID = 0x75,
    LEVEL = 0x76,
    SELF_ADDRESS = 0x77,
    never = 0x78,
    NEVER = 0x79,
    UNPAIR = 0x7A,
    VOTING_POWER = 0x7B,
    TOTAL_VOTING_POWER = 0x7C,
    KECCAK = 0x7D,
    SHA3 = 0x7E,
    PAIRING_CHECK = 0x7F,
    bls12_381_g1 = 0x80,
    bls12_381_g2 = 0x81,
    bls12_381_fr = 0x82,
    sapling_state = 0x83,
    sapling_transaction_deprecated = 0x84,
    SAPLING_EMPTY_STATE = 0x85,
    SAPLING_VERIFY_UPDATE = 0x86,
    ticket = 0x87,
    TICKET_DEPRECATED = 0x88,
    READ_TICKET = 0x89,
    SPLIT_TICKET = 0x8A,
    JOIN_TICKETS = 0x8B,
    GET_AND_UPDATE = 0x8C,
    chest = 0x8D,
    chest_key = 0x8E,
    OPEN_CHEST = 0x8F,
    VIEW = 0x90,
    view = 0x91,
    constant = 0x92,
    SUB_MUTEZ = 0x93,
    tx_rollup_l2_address = 0x94,
    MIN_BLOCK_TIME = 0x95,
    sapling_transaction = 0x96,
    EMIT = 0x97,
    Lambda_rec = 0x98,
    LAMBDA_REC = 0x99,
    TICKET = 0x9A,
    BYTES = 0x9B,
    NAT = 0x9C,
    Ticket = 0x9D,
    IS_IMPLICIT_ACCOUNT = 0x9E,
    INDEX_ADDRESS = 0x9F,
    GET_ADDRESS_INDEX = 0xA0,
}

impl OpCode {
    /// Binary tag of this primitive
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Top-level script section keywords (`parameter`, `storage`, `code`, `view`)
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            OpCode::parameter | OpCode::storage | OpCode::code | OpCode::view
        )
    }

    /// Data constructors such as `Pair`, `Some` or `Elt`
    pub fn is_data(self) -> bool {
        matches!(
            self,
            OpCode::False
                | OpCode::Elt
                | OpCode::Left
                | OpCode::None
                | OpCode::Pair
                | OpCode::Right
                | OpCode::Some
                | OpCode::True
                | OpCode::Unit
                | OpCode::Lambda_rec
                | OpCode::Ticket
        )
    }

    /// Type constructors such as `pair`, `big_map` or `address`
    pub fn is_type(self) -> bool {
        let name = self.name();
        !self.is_keyword()
            && self != OpCode::constant
            && name.starts_with(|c: char| c.is_ascii_lowercase())
    }

    /// Instructions (all upper case primitives)
    pub fn is_instruction(self) -> bool {
        !self.is_keyword() && !self.is_data() && !self.is_type() && self != OpCode::constant
    }

    /// Global constant reference (`constant "expr..."`)
    pub fn is_constant(self) -> bool {
        self == OpCode::constant
    }
}

impl TryFrom<u8> for OpCode {
    type Error = MichelineError;

    fn try_from(byte: u8) -> Result<Self> {
        OPCODES
            .get(byte as usize)
            .copied()
            .ok_or(MichelineError::UnknownOpcode(byte))
    }
}

impl FromStr for OpCode {
    type Err = MichelineError;

    fn from_str(s: &str) -> Result<Self> {
        OpCode::parse(s)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
