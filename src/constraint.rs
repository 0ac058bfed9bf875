//! High-level pattern constraints: the planner's input language.
//!
//! A query arrives as a [`Pattern`] in disjunctive normal form. Each
//! [`Conjunction`] is planned independently and becomes one branch of the
//! emitted traversal plan.

use serde::{Deserialize, Serialize};

use crate::types::{ThingId, Value, Var};

/// Comparison operator inside a value constraint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// Equal.
    Eq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

/// Right-hand side of a value comparison.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// A literal value.
    Literal(Value),
    /// Another variable; the comparison can only run once it is bound.
    Variable(Var),
}

/// A value comparison applied to an attribute variable.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Comparison {
    /// The comparison operator.
    pub op: CmpOp,
    /// The right-hand side operand.
    pub rhs: Operand,
}

impl Comparison {
    /// Equality against a literal; the only indexable comparison form.
    pub fn eq(value: impl Into<Value>) -> Self {
        Comparison {
            op: CmpOp::Eq,
            rhs: Operand::Literal(value.into()),
        }
    }

    /// An arbitrary comparison against a literal.
    pub fn literal(op: CmpOp, value: impl Into<Value>) -> Self {
        Comparison {
            op,
            rhs: Operand::Literal(value.into()),
        }
    }

    /// A comparison against another variable.
    pub fn var(op: CmpOp, rhs: Var) -> Self {
        Comparison {
            op,
            rhs: Operand::Variable(rhs),
        }
    }

    /// True for equality against a literal value.
    pub fn is_indexable_eq(&self) -> bool {
        self.op == CmpOp::Eq && matches!(self.rhs, Operand::Literal(_))
    }
}

/// One typed constraint over query variables.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Constraint {
    /// `thing` is an instance of the type bound to `type_var`.
    Isa {
        /// The instance variable.
        thing: Var,
        /// The type variable.
        type_var: Var,
    },
    /// The type bound to `subtype` is a subtype of the one bound to `supertype`.
    Sub {
        /// The subtype variable.
        subtype: Var,
        /// The supertype variable.
        supertype: Var,
    },
    /// `player` fills a role in the relation instance bound to `relation`.
    Links {
        /// The relation instance variable.
        relation: Var,
        /// The role-player variable.
        player: Var,
        /// Optional role name, resolved against the schema.
        role: Option<String>,
    },
    /// `owner` owns the attribute instance bound to `attribute`.
    Has {
        /// The owning instance variable.
        owner: Var,
        /// The attribute instance variable.
        attribute: Var,
    },
    /// `type_var` is the schema type with the given label.
    Label {
        /// The type variable.
        type_var: Var,
        /// The label, resolved against the schema.
        label: String,
    },
    /// `thing` is the concrete element with the given identifier.
    Id {
        /// The instance variable.
        thing: Var,
        /// The concrete identifier.
        id: ThingId,
    },
    /// The attribute bound to `attribute` satisfies a value comparison.
    Value {
        /// The attribute variable.
        attribute: Var,
        /// The comparison to satisfy.
        cmp: Comparison,
    },
    /// The two variables are bound to distinct elements.
    Neq {
        /// Left-hand variable.
        lhs: Var,
        /// Right-hand variable.
        rhs: Var,
    },
}

impl Constraint {
    /// Shorthand for an isa constraint.
    pub fn isa(thing: impl Into<Var>, type_var: impl Into<Var>) -> Self {
        Constraint::Isa {
            thing: thing.into(),
            type_var: type_var.into(),
        }
    }

    /// Shorthand for a sub constraint.
    pub fn sub(subtype: impl Into<Var>, supertype: impl Into<Var>) -> Self {
        Constraint::Sub {
            subtype: subtype.into(),
            supertype: supertype.into(),
        }
    }

    /// Shorthand for a role-player constraint.
    pub fn links(
        relation: impl Into<Var>,
        player: impl Into<Var>,
        role: Option<&str>,
    ) -> Self {
        Constraint::Links {
            relation: relation.into(),
            player: player.into(),
            role: role.map(str::to_string),
        }
    }

    /// Shorthand for an attribute-ownership constraint.
    pub fn has(owner: impl Into<Var>, attribute: impl Into<Var>) -> Self {
        Constraint::Has {
            owner: owner.into(),
            attribute: attribute.into(),
        }
    }

    /// Shorthand for a label constraint.
    pub fn label(type_var: impl Into<Var>, label: impl Into<String>) -> Self {
        Constraint::Label {
            type_var: type_var.into(),
            label: label.into(),
        }
    }

    /// Shorthand for an identifier constraint.
    pub fn id(thing: impl Into<Var>, id: ThingId) -> Self {
        Constraint::Id {
            thing: thing.into(),
            id,
        }
    }

    /// Shorthand for a value constraint.
    pub fn value(attribute: impl Into<Var>, cmp: Comparison) -> Self {
        Constraint::Value {
            attribute: attribute.into(),
            cmp,
        }
    }

    /// Shorthand for an inequality constraint.
    pub fn neq(lhs: impl Into<Var>, rhs: Var) -> Self {
        Constraint::Neq {
            lhs: lhs.into(),
            rhs,
        }
    }

    /// All variables this constraint mentions, in declaration order.
    pub fn vars(&self) -> Vec<&Var> {
        match self {
            Constraint::Isa { thing, type_var } => vec![thing, type_var],
            Constraint::Sub { subtype, supertype } => vec![subtype, supertype],
            Constraint::Links {
                relation, player, ..
            } => vec![relation, player],
            Constraint::Has { owner, attribute } => vec![owner, attribute],
            Constraint::Label { type_var, .. } => vec![type_var],
            Constraint::Id { thing, .. } => vec![thing],
            Constraint::Value { attribute, cmp } => match &cmp.rhs {
                Operand::Variable(other) => vec![attribute, other],
                Operand::Literal(_) => vec![attribute],
            },
            Constraint::Neq { lhs, rhs } => vec![lhs, rhs],
        }
    }
}

/// A conjunction of constraints, planned as one unit.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conjunction {
    /// The constraints, in declaration order.
    pub constraints: Vec<Constraint>,
}

impl Conjunction {
    /// Creates a conjunction from a list of constraints.
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }
}

/// A pattern in disjunctive normal form: one branch per conjunction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pattern {
    /// The disjunctive branches. Each is planned independently.
    pub branches: Vec<Conjunction>,
}

impl Pattern {
    /// A pattern with a single conjunctive branch.
    pub fn conjunction(constraints: Vec<Constraint>) -> Self {
        Self {
            branches: vec![Conjunction::new(constraints)],
        }
    }

    /// A pattern with several disjunctive branches.
    pub fn disjunction(branches: Vec<Conjunction>) -> Self {
        Self { branches }
    }
}
