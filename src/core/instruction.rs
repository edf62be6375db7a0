//! Instruction trees evaluated by tasks.
//!
//! Plain values are turned into instructions at the boundary with `From`:
//! integers become [`Instruction::Constant`], strings and cells become
//! [`Instruction::Read`]. The composing constructors reject the shapes that
//! cannot produce a value where one is needed.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::core::memory::{Cell, Memory};
use crate::error::{Error, Result};
use crate::dlog_trace;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    /// Floor division, rounding toward negative infinity.
    Div,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    /// Apply the operator. `None` on overflow or division by zero.
    pub fn apply(&self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            Operator::Add => lhs.checked_add(rhs),
            Operator::Sub => lhs.checked_sub(rhs),
            Operator::Mul => lhs.checked_mul(rhs),
            Operator::Div => {
                let quotient = lhs.checked_div(rhs)?;
                if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
                    quotient.checked_sub(1)
                } else {
                    Some(quotient)
                }
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A node of an instruction tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// A literal integer.
    Constant(i64),
    /// The current value of a cell.
    Read(String),
    /// Evaluate `source` and store it in `target`.
    Assign {
        target: String,
        source: Box<Instruction>,
    },
    /// Combine two operands, optionally storing the result in `target`.
    BinaryOp {
        op: Operator,
        lhs: Box<Instruction>,
        rhs: Box<Instruction>,
        target: Option<String>,
    },
    /// Block the executing thread. Produces no value.
    Delay(Duration),
}

impl From<i64> for Instruction {
    fn from(value: i64) -> Self {
        Instruction::Constant(value)
    }
}

// Unsuffixed integer literals default to i32.
impl From<i32> for Instruction {
    fn from(value: i32) -> Self {
        Instruction::Constant(i64::from(value))
    }
}

impl From<&str> for Instruction {
    fn from(name: &str) -> Self {
        Instruction::Read(name.to_string())
    }
}

impl From<String> for Instruction {
    fn from(name: String) -> Self {
        Instruction::Read(name)
    }
}

impl From<&Cell> for Instruction {
    fn from(cell: &Cell) -> Self {
        Instruction::Read(cell.name().to_string())
    }
}

impl Instruction {
    pub fn constant(value: i64) -> Self {
        Instruction::Constant(value)
    }

    pub fn read(name: impl Into<String>) -> Self {
        Instruction::Read(name.into())
    }

    pub fn delay(duration: Duration) -> Self {
        Instruction::Delay(duration)
    }

    /// `target = source`.
    ///
    /// # Errors
    /// `InvalidInstructionComposition` if `source` does not produce a value.
    pub fn assign(target: impl Into<String>, source: impl Into<Instruction>) -> Result<Self> {
        let source = source.into();
        source.check_value_producing("the source of an assignment")?;
        Ok(Instruction::Assign {
            target: target.into(),
            source: Box::new(source),
        })
    }

    /// `lhs op rhs`, result returned but not stored.
    pub fn binary(
        op: Operator,
        lhs: impl Into<Instruction>,
        rhs: impl Into<Instruction>,
    ) -> Result<Self> {
        let lhs = lhs.into();
        let rhs = rhs.into();
        lhs.check_value_producing("an operand")?;
        rhs.check_value_producing("an operand")?;
        Ok(Instruction::BinaryOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            target: None,
        })
    }

    /// `target = lhs op rhs`.
    pub fn binary_into(
        op: Operator,
        lhs: impl Into<Instruction>,
        rhs: impl Into<Instruction>,
        target: impl Into<String>,
    ) -> Result<Self> {
        match Self::binary(op, lhs, rhs)? {
            Instruction::BinaryOp { op, lhs, rhs, .. } => Ok(Instruction::BinaryOp {
                op,
                lhs,
                rhs,
                target: Some(target.into()),
            }),
            other => Ok(other),
        }
    }

    pub fn add(lhs: impl Into<Instruction>, rhs: impl Into<Instruction>) -> Result<Self> {
        Self::binary(Operator::Add, lhs, rhs)
    }

    pub fn sub(lhs: impl Into<Instruction>, rhs: impl Into<Instruction>) -> Result<Self> {
        Self::binary(Operator::Sub, lhs, rhs)
    }

    pub fn mul(lhs: impl Into<Instruction>, rhs: impl Into<Instruction>) -> Result<Self> {
        Self::binary(Operator::Mul, lhs, rhs)
    }

    pub fn div(lhs: impl Into<Instruction>, rhs: impl Into<Instruction>) -> Result<Self> {
        Self::binary(Operator::Div, lhs, rhs)
    }

    /// The cell this instruction writes at its root, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Instruction::Assign { target, .. } => Some(target),
            Instruction::BinaryOp { target, .. } => target.as_deref(),
            _ => None,
        }
    }

    /// The literal of an `x = <constant>` assignment.
    pub(crate) fn assigned_constant_mut(&mut self) -> Option<&mut i64> {
        match self {
            Instruction::Assign { source, .. } => match source.as_mut() {
                Instruction::Constant(value) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    fn check_value_producing(&self, role: &str) -> Result<()> {
        match self {
            Instruction::Delay(_) => Err(Error::InvalidInstructionComposition(format!(
                "a delay cannot be used as {}",
                role
            ))),
            Instruction::Assign { .. } => Err(Error::InvalidInstructionComposition(format!(
                "an assignment cannot be used as {}",
                role
            ))),
            _ => Ok(()),
        }
    }

    /// Check the whole tree for compositions the constructors would reject.
    ///
    /// Needed because the variants are public and can be built directly.
    pub fn validate(&self) -> Result<()> {
        match self {
            Instruction::Assign { source, .. } => {
                source.check_value_producing("the source of an assignment")?;
                source.validate()
            }
            Instruction::BinaryOp { lhs, rhs, .. } => {
                lhs.check_value_producing("an operand")?;
                rhs.check_value_producing("an operand")?;
                lhs.validate()?;
                rhs.validate()
            }
            _ => Ok(()),
        }
    }

    /// Collect the cells this tree reads and writes.
    ///
    /// `inside_write` is set while walking below an assignment or a
    /// targeted operator: a targeted operator found there has its target
    /// read back by the enclosing construct.
    pub(crate) fn collect_domains(
        &self,
        reads: &mut BTreeSet<String>,
        writes: &mut BTreeSet<String>,
        inside_write: bool,
    ) {
        match self {
            Instruction::Constant(_) | Instruction::Delay(_) => {}
            Instruction::Read(name) => {
                reads.insert(name.clone());
            }
            Instruction::Assign { target, source } => {
                writes.insert(target.clone());
                source.collect_domains(reads, writes, true);
            }
            Instruction::BinaryOp {
                lhs, rhs, target, ..
            } => {
                if let Some(target) = target {
                    writes.insert(target.clone());
                    if inside_write {
                        reads.insert(target.clone());
                    }
                }
                let nested = inside_write || target.is_some();
                lhs.collect_domains(reads, writes, nested);
                rhs.collect_domains(reads, writes, nested);
            }
        }
    }

    /// Evaluate against `memory`. Delays return `None`.
    pub fn evaluate(&self, memory: &Memory) -> Result<Option<i64>> {
        match self {
            Instruction::Constant(value) => Ok(Some(*value)),
            Instruction::Read(name) => memory.read(name).map(Some),
            Instruction::Assign { target, source } => {
                let value = source.value(memory)?;
                memory.set(target, value);
                dlog_trace!("{} <- {}", target, value);
                Ok(Some(value))
            }
            Instruction::BinaryOp {
                op,
                lhs,
                rhs,
                target,
            } => {
                let a = lhs.value(memory)?;
                let b = rhs.value(memory)?;
                let value = op.apply(a, b).ok_or_else(|| {
                    if *op == Operator::Div && b == 0 {
                        Error::DivisionByZero(self.to_string())
                    } else {
                        Error::ArithmeticOverflow(self.to_string())
                    }
                })?;
                if let Some(target) = target {
                    memory.set(target, value);
                    dlog_trace!("{} <- {}", target, value);
                }
                Ok(Some(value))
            }
            Instruction::Delay(duration) => {
                std::thread::sleep(*duration);
                Ok(None)
            }
        }
    }

    fn value(&self, memory: &Memory) -> Result<i64> {
        self.evaluate(memory)?.ok_or_else(|| {
            Error::InvalidInstructionComposition(format!("{} does not produce a value", self))
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Constant(value) => write!(f, "{}", value),
            Instruction::Read(name) => f.write_str(name),
            Instruction::Assign { target, source } => write!(f, "{} = {}", target, source),
            Instruction::BinaryOp {
                op,
                lhs,
                rhs,
                target: Some(target),
            } => write!(f, "{} = {} {} {}", target, lhs, op, rhs),
            Instruction::BinaryOp {
                op,
                lhs,
                rhs,
                target: None,
            } => write!(f, "({} {} {})", lhs, op, rhs),
            Instruction::Delay(duration) => write!(f, "Delay({:?})", duration),
        }
    }
}
