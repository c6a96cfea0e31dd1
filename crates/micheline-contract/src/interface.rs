//! Token standard interfaces
//!
//! An interface is a set of entrypoint names with their argument types.
//! A parameter type implements it when every entrypoint is present with a
//! structurally equal type, annotations and comb layout ignored.

use micheline_core::{Entrypoints, OpCode, Prim};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well known token interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interface {
    #[serde(rename = "FA1")]
    Fa1,
    #[serde(rename = "FA1.2")]
    Fa1_2,
    #[serde(rename = "FA2")]
    Fa2,
}

fn t(op: OpCode) -> Prim {
    Prim::prim0(op)
}

fn callback(ret: Prim) -> Prim {
    Prim::contract_type(ret)
}

impl Interface {
    /// Detection order
    ///
    /// FA1 is checked before FA1.2, so an FA1.2 contract that also exposes
    /// the FA1 entrypoints is classified as FA1. Clients rely on this.
    pub const PRECEDENCE: [Interface; 3] = [Interface::Fa1, Interface::Fa1_2, Interface::Fa2];

    pub fn name(self) -> &'static str {
        match self {
            Interface::Fa1 => "FA1",
            Interface::Fa1_2 => "FA1.2",
            Interface::Fa2 => "FA2",
        }
    }

    /// Required entrypoints and their argument types
    pub fn signatures(self) -> Vec<(&'static str, Prim)> {
        let transfer_fa1 = (
            "transfer",
            Prim::comb_type(vec![t(OpCode::address), t(OpCode::address), t(OpCode::nat)]),
        );
        let get_balance = (
            "getBalance",
            Prim::pair_type(t(OpCode::address), callback(t(OpCode::nat))),
        );
        let get_total_supply = (
            "getTotalSupply",
            Prim::pair_type(t(OpCode::unit), callback(t(OpCode::nat))),
        );
        match self {
            Interface::Fa1 => vec![transfer_fa1, get_balance, get_total_supply],
            Interface::Fa1_2 => vec![
                transfer_fa1,
                ("approve", Prim::pair_type(t(OpCode::address), t(OpCode::nat))),
                (
                    "getAllowance",
                    Prim::pair_type(
                        Prim::pair_type(t(OpCode::address), t(OpCode::address)),
                        callback(t(OpCode::nat)),
                    ),
                ),
                get_balance,
                get_total_supply,
            ],
            Interface::Fa2 => {
                let operator = Prim::comb_type(vec![
                    t(OpCode::address),
                    t(OpCode::address),
                    t(OpCode::nat),
                ]);
                vec![
                    (
                        "transfer",
                        Prim::list_type(Prim::pair_type(
                            t(OpCode::address),
                            Prim::list_type(Prim::comb_type(vec![
                                t(OpCode::address),
                                t(OpCode::nat),
                                t(OpCode::nat),
                            ])),
                        )),
                    ),
                    (
                        "balance_of",
                        Prim::pair_type(
                            Prim::list_type(Prim::pair_type(t(OpCode::address), t(OpCode::nat))),
                            callback(Prim::list_type(Prim::pair_type(
                                Prim::pair_type(t(OpCode::address), t(OpCode::nat)),
                                t(OpCode::nat),
                            ))),
                        ),
                    ),
                    (
                        "update_operators",
                        Prim::list_type(Prim::or_type(operator.clone(), operator)),
                    ),
                ]
            }
        }
    }

    /// Whether every required entrypoint exists with a matching type
    pub fn matches(self, eps: &Entrypoints) -> bool {
        self.signatures().iter().all(|(name, want)| {
            eps.get(name)
                .map(|ep| ep.typ.prim().unfold_pairs().is_equal(&want.unfold_pairs()))
                .unwrap_or(false)
        })
    }

    /// First interface in [`Interface::PRECEDENCE`] the entrypoints implement
    pub fn detect(eps: &Entrypoints) -> Option<Interface> {
        Interface::PRECEDENCE.into_iter().find(|i| i.matches(eps))
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micheline_core::Type;

    fn param_of(iface: Interface) -> Type {
        let leaves: Vec<Prim> = iface
            .signatures()
            .into_iter()
            .map(|(name, typ)| typ.with_annot(format!("%{}", name)))
            .collect();
        let mut iter = leaves.into_iter().rev();
        let last = iter.next().unwrap();
        Type(iter.fold(last, |acc, leaf| Prim::or_type(leaf, acc)))
    }

    #[test]
    fn test_each_interface_matches_itself() {
        for iface in Interface::PRECEDENCE {
            assert!(iface.matches(&param_of(iface).entrypoints()), "{}", iface);
        }
    }

    #[test]
    fn test_fa12_with_fa1_entrypoints_is_reported_as_fa1() {
        let eps = param_of(Interface::Fa1_2).entrypoints();
        assert!(Interface::Fa1_2.matches(&eps));
        assert!(Interface::Fa1.matches(&eps));
        assert_eq!(Interface::detect(&eps), Some(Interface::Fa1));
        assert_eq!(Interface::detect(&param_of(Interface::Fa1).entrypoints()), Some(Interface::Fa1));
        assert_eq!(Interface::detect(&param_of(Interface::Fa2).entrypoints()), Some(Interface::Fa2));
    }

    #[test]
    fn test_type_mismatch() {
        let t = Type(Prim::or_type(
            Prim::prim0(OpCode::nat).with_annot("%transfer"),
            Prim::prim0(OpCode::unit).with_annot("%getBalance"),
        ));
        assert_eq!(Interface::detect(&t.entrypoints()), None);
    }

    #[test]
    fn test_flat_pair_layout_matches() {
        let flat = Prim::app(
            OpCode::pair,
            vec![Prim::prim0(OpCode::address), Prim::prim0(OpCode::address), Prim::prim0(OpCode::nat)],
        );
        let (_, want) = &Interface::Fa1.signatures()[0];
        assert!(flat.unfold_pairs().is_equal(&want.unfold_pairs()));
    }
}
