//! Typed syntax tree definitions
//!
//! A [`Program`] is an ordered sequence of class declarations plus the name
//! of the class/method pair the process entry point starts in. Statements and
//! expressions are plain enums; `Display` renders any node as a compact
//! one-liner, which the code generator uses for its assembly comments.

use crate::types::Ty;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub classes: Vec<ClassDecl>,
    /// Class instantiated by the process entry point.
    #[serde(default = "default_main_class")]
    pub main_class: String,
    /// Zero-argument method the entry point calls on that instance.
    #[serde(default = "default_main_method")]
    pub main_method: String,
}

fn default_main_class() -> String {
    "Main".to_string()
}

fn default_main_method() -> String {
    "main".to_string()
}

impl Program {
    pub fn new(classes: Vec<ClassDecl>) -> Self {
        Program {
            classes,
            main_class: default_main_class(),
            main_method: default_main_method(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default = "default_superclass")]
    pub superclass: String,
    #[serde(default)]
    pub fields: Vec<VarDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

fn default_superclass() -> String {
    crate::OBJECT_CLASS.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Ty,
}

impl VarDecl {
    pub fn new(name: &str, ty: Ty) -> Self {
        VarDecl {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<VarDecl>,
    #[serde(default = "default_return_ty")]
    pub return_ty: Ty,
    /// Local variables, in declaration order. Resolved by the front end;
    /// the back end only assigns frame offsets.
    #[serde(default)]
    pub locals: Vec<VarDecl>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

fn default_return_ty() -> Ty {
    Ty::Void
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Assign {
        target: Expr,
        value: Expr,
    },
    IfElse {
        condition: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// Built-in integer output.
    Write {
        value: Expr,
    },
    /// Built-in float output.
    WriteFloat {
        value: Expr,
    },
    /// Built-in newline output.
    Writeln,
    Return {
        value: Option<Expr>,
    },
    /// Method call whose result is discarded.
    Call {
        receiver: Expr,
        method: String,
        args: Vec<Expr>,
    },
    Nop,
}

/// An expression together with its resolved static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    IntConst(i32),
    FloatConst(f32),
    BooleanConst(bool),
    NullConst,
    This,
    /// A bare identifier: a local, a parameter, or an unqualified field of
    /// the enclosing class.
    Var { name: String },
    Field {
        receiver: Box<Expr>,
        name: String,
        /// Static class the field lookup resolved in.
        class: String,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    NewObject {
        class: String,
    },
    /// Array allocation; the element type is the element of `ty`.
    NewArray {
        length: Box<Expr>,
    },
    /// Type cast; the target type is the expression's own `ty`.
    Cast {
        operand: Box<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Built-in integer input.
    Read,
    /// Built-in float input.
    ReadFloat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

impl Expr {
    pub fn int(value: i32) -> Self {
        Expr {
            kind: ExprKind::IntConst(value),
            ty: Ty::Int,
        }
    }

    pub fn float(value: f32) -> Self {
        Expr {
            kind: ExprKind::FloatConst(value),
            ty: Ty::Float,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Expr {
            kind: ExprKind::BooleanConst(value),
            ty: Ty::Boolean,
        }
    }

    pub fn null() -> Self {
        Expr {
            kind: ExprKind::NullConst,
            ty: Ty::Null,
        }
    }

    pub fn this(class: &str) -> Self {
        Expr {
            kind: ExprKind::This,
            ty: Ty::Class(class.to_string()),
        }
    }

    pub fn var(name: &str, ty: Ty) -> Self {
        Expr {
            kind: ExprKind::Var {
                name: name.to_string(),
            },
            ty,
        }
    }

    pub fn field(receiver: Expr, name: &str, class: &str, ty: Ty) -> Self {
        Expr {
            kind: ExprKind::Field {
                receiver: Box::new(receiver),
                name: name.to_string(),
                class: class.to_string(),
            },
            ty,
        }
    }

    pub fn index(array: Expr, index: Expr, ty: Ty) -> Self {
        Expr {
            kind: ExprKind::Index {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let ty = if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            Ty::Boolean
        } else {
            left.ty.clone()
        };
        Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        }
    }

    pub fn new_object(class: &str) -> Self {
        Expr {
            kind: ExprKind::NewObject {
                class: class.to_string(),
            },
            ty: Ty::Class(class.to_string()),
        }
    }

    pub fn new_array(elem: Ty, length: Expr) -> Self {
        Expr {
            kind: ExprKind::NewArray {
                length: Box::new(length),
            },
            ty: Ty::Array(Box::new(elem)),
        }
    }

    pub fn cast(operand: Expr, target: Ty) -> Self {
        Expr {
            kind: ExprKind::Cast {
                operand: Box::new(operand),
            },
            ty: target,
        }
    }

    pub fn call(receiver: Expr, method: &str, args: Vec<Expr>, ty: Ty) -> Self {
        Expr {
            kind: ExprKind::MethodCall {
                receiver: Box::new(receiver),
                method: method.to_string(),
                args,
            },
            ty,
        }
    }

    pub fn read() -> Self {
        Expr {
            kind: ExprKind::Read,
            ty: Ty::Int,
        }
    }

    pub fn read_float() -> Self {
        Expr {
            kind: ExprKind::ReadFloat,
            ty: Ty::Float,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{}", text)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "!",
        };
        write!(f, "{}", text)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::IntConst(value) => write!(f, "{}", value),
            ExprKind::FloatConst(value) => write!(f, "{}", value),
            ExprKind::BooleanConst(value) => write!(f, "{}", value),
            ExprKind::NullConst => write!(f, "null"),
            ExprKind::This => write!(f, "this"),
            ExprKind::Var { name } => write!(f, "{}", name),
            ExprKind::Field { receiver, name, .. } => write!(f, "{}.{}", receiver, name),
            ExprKind::Index { array, index } => write!(f, "{}[{}]", array, index),
            ExprKind::Unary { op, operand } => write!(f, "({}{})", op, operand),
            ExprKind::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            ExprKind::NewObject { class } => write!(f, "new {}()", class),
            ExprKind::NewArray { length } => match &self.ty {
                Ty::Array(elem) => write!(f, "new {}[{}]", elem.name(), length),
                other => write!(f, "new {}[{}]", other.name(), length),
            },
            ExprKind::Cast { operand } => write!(f, "({}){}", self.ty.name(), operand),
            ExprKind::MethodCall {
                receiver, method, ..
            } => write!(f, "{}.{}(...)", receiver, method),
            ExprKind::Read => write!(f, "read()"),
            ExprKind::ReadFloat => write!(f, "readf()"),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { target, value } => write!(f, "{} = {}", target, value),
            Stmt::IfElse { condition, .. } => write!(f, "if ({})", condition),
            Stmt::While { condition, .. } => write!(f, "while ({})", condition),
            Stmt::Write { value } => write!(f, "write({})", value),
            Stmt::WriteFloat { value } => write!(f, "writef({})", value),
            Stmt::Writeln => write!(f, "writeln()"),
            Stmt::Return { value: Some(value) } => write!(f, "return {}", value),
            Stmt::Return { value: None } => write!(f, "return"),
            Stmt::Call {
                receiver, method, ..
            } => write!(f, "{}.{}(...)", receiver, method),
            Stmt::Nop => write!(f, "nop"),
        }
    }
}
