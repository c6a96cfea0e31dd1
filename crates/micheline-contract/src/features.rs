//! Protocol features used by a script

use micheline_core::{OpCode, Prim, Visit};
use std::fmt;

bitflags::bitflags! {
    /// Set of protocol features referenced by code or types
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u16 {
        const ACCOUNT_FACTORY = 1 << 0;
        const CONTRACT_FACTORY = 1 << 1;
        const SET_DELEGATE = 1 << 2;
        const LAMBDA = 1 << 3;
        const TRANSFER_TOKENS = 1 << 4;
        const CHAIN_ID = 1 << 5;
        const TICKET = 1 << 6;
        const SAPLING = 1 << 7;
        const VIEW = 1 << 8;
        const GLOBAL_CONSTANT = 1 << 9;
        const TIMELOCK = 1 << 10;
        const EVENT = 1 << 11;
    }
}

impl Features {
    /// Lowercase names of the contained features in bit order
    pub fn names(self) -> Vec<String> {
        self.iter_names().map(|(name, _)| name.to_lowercase()).collect()
    }

    fn of(op: OpCode) -> Features {
        match op {
            OpCode::CREATE_ACCOUNT => Features::ACCOUNT_FACTORY,
            OpCode::CREATE_CONTRACT => Features::CONTRACT_FACTORY,
            OpCode::SET_DELEGATE => Features::SET_DELEGATE,
            OpCode::LAMBDA | OpCode::LAMBDA_REC | OpCode::lambda | OpCode::Lambda_rec => {
                Features::LAMBDA
            }
            OpCode::TRANSFER_TOKENS => Features::TRANSFER_TOKENS,
            OpCode::CHAIN_ID | OpCode::chain_id => Features::CHAIN_ID,
            OpCode::ticket
            | OpCode::Ticket
            | OpCode::TICKET
            | OpCode::TICKET_DEPRECATED
            | OpCode::READ_TICKET
            | OpCode::SPLIT_TICKET
            | OpCode::JOIN_TICKETS => Features::TICKET,
            OpCode::sapling_state
            | OpCode::sapling_transaction
            | OpCode::sapling_transaction_deprecated
            | OpCode::SAPLING_EMPTY_STATE
            | OpCode::SAPLING_VERIFY_UPDATE => Features::SAPLING,
            OpCode::view | OpCode::VIEW => Features::VIEW,
            OpCode::constant => Features::GLOBAL_CONSTANT,
            OpCode::chest | OpCode::chest_key | OpCode::OPEN_CHEST => Features::TIMELOCK,
            OpCode::EMIT => Features::EVENT,
            _ => Features::empty(),
        }
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

/// Features referenced anywhere in `p`
pub fn detect_features(p: &Prim) -> Features {
    let mut out = Features::empty();
    p.walk(&mut |node| {
        if let Some(op) = node.op() {
            out.insert(Features::of(op));
        }
        Visit::Continue
    });
    out
}
