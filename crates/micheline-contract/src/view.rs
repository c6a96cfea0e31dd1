//! On-chain views declared in a script's `view` sections

use crate::error::{ContractError, Result};
use micheline_core::{OpCode, Prim, Type};
use serde::{Deserialize, Serialize};

/// A named read-only entry `view "name" <param> <return> { code }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub param: Type,
    #[serde(rename = "return")]
    pub ret: Type,
    pub code: Prim,
}

impl View {
    /// Parse a `view` section
    pub fn new(p: &Prim) -> Result<View> {
        if !p.is_op(OpCode::view) || p.args().len() != 4 {
            return Err(ContractError::shape(format!(
                "{} is not a view section",
                p.dump_limit(64)
            )));
        }
        let args = p.args();
        let name = args[0]
            .as_str()
            .ok_or_else(|| ContractError::shape("view name is not a string"))?;
        Ok(View {
            name: name.to_string(),
            param: Type(args[1].clone()),
            ret: Type(args[2].clone()),
            code: args[3].clone(),
        })
    }

    /// Rebuild the `view` section
    pub fn to_prim(&self) -> Prim {
        Prim::app(
            OpCode::view,
            vec![
                Prim::string(self.name.clone()),
                self.param.prim().clone(),
                self.ret.prim().clone(),
                self.code.clone(),
            ],
        )
    }

    /// Same name and signature, annotations ignored
    pub fn is_equal(&self, other: &View) -> bool {
        self.name == other.name
            && self.param.is_equal(&other.param)
            && self.ret.is_equal(&other.ret)
    }

    /// Same name and signature including annotations
    pub fn is_equal_with_anno(&self, other: &View) -> bool {
        self.name == other.name
            && self.param.is_equal_with_anno(&other.param)
            && self.ret.is_equal_with_anno(&other.ret)
    }

    /// Same signature with annotations and identical code
    pub fn is_equal_with_code(&self, other: &View) -> bool {
        self.is_equal_with_anno(other) && self.code.is_equal_with_anno(&other.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Prim {
        Prim::app(
            OpCode::view,
            vec![
                Prim::string("my_view"),
                Prim::prim0(OpCode::nat),
                Prim::prim0(OpCode::int),
                Prim::seq(vec![Prim::prim0(OpCode::UNIT)]),
            ],
        )
    }

    #[test]
    fn test_parse_view() {
        let v = View::new(&sample()).unwrap();
        assert_eq!(v.name, "my_view");
        assert!(v.param.is(OpCode::nat));
        assert!(v.ret.is(OpCode::int));
        assert_eq!(v.to_prim(), sample());
        let copy = v.clone();
        assert!(v.is_equal(&copy) && v.is_equal_with_anno(&copy) && v.is_equal_with_code(&copy));
    }

    #[test]
    fn test_equality_levels() {
        let v = View::new(&sample()).unwrap();
        let mut annotated = v.clone();
        annotated.param = Type(Prim::prim0(OpCode::nat).with_annot(":amount"));
        assert!(v.is_equal(&annotated));
        assert!(!v.is_equal_with_anno(&annotated));

        let mut recoded = v.clone();
        recoded.code = Prim::seq(vec![Prim::prim0(OpCode::DROP)]);
        assert!(v.is_equal_with_anno(&recoded));
        assert!(!v.is_equal_with_code(&recoded));
    }

    #[test]
    fn test_rejects_non_views() {
        assert!(View::new(&Prim::unit()).is_err());
        let bad = Prim::app(
            OpCode::view,
            vec![Prim::int(1), Prim::unit(), Prim::unit(), Prim::seq(vec![])],
        );
        assert!(View::new(&bad).is_err());
    }
}
