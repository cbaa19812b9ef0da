//! The shared token and opcode space.
//!
//! Parser token kinds and interpreter opcodes live in one flat enumeration.
//! Values between [`Token::FIRST_BYTECODE`] and [`Token::LAST_BYTECODE`]
//! (inclusive) may appear in a compiled unit's bytecode; everything after
//! that range only exists in trees.

use std::fmt;
use std::str::FromStr;

macro_rules! tokens {
    (
        markers { $($(#[$mm:meta])* $mv:ident => $mn:literal,)* }
        bytecode { $($(#[$bm:meta])* $bv:ident => $bn:literal,)* }
        parse { $($(#[$pm:meta])* $pv:ident => $pn:literal,)* }
    ) => {
        /// A token kind or an interpreter opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Token {
            $($(#[$mm])* $mv,)*
            $($(#[$bm])* $bv,)*
            $($(#[$pm])* $pv,)*
        }

        impl Token {
            /// Every token in discriminant order.
            pub const ALL: &'static [Token] = &[
                $(Token::$mv,)*
                $(Token::$bv,)*
                $(Token::$pv,)*
            ];

            /// The canonical upper-case name of this token.
            pub fn name(self) -> &'static str {
                match self {
                    $(Token::$mv => $mn,)*
                    $(Token::$bv => $bn,)*
                    $(Token::$pv => $pn,)*
                }
            }
        }
    };
}

tokens! {
    markers {
        /// Scanner error
        Error => "ERROR",
        /// End of input
        Eof => "EOF",
        /// End of line
        Eol => "EOL",
    }
    bytecode {
        /// Pop the stack into the script result register
        Popv => "POPV",
        /// Push an object onto the scope chain
        EnterWith => "ENTERWITH",
        /// Pop the innermost `with` scope
        LeaveWith => "LEAVEWITH",
        /// Return the value on top of the stack
        Return => "RETURN",
        /// Unconditional jump
        Goto => "GOTO",
        /// Jump if true
        IfEq => "IFEQ",
        /// Jump if false
        IfNe => "IFNE",
        /// Assign through a bound name
        SetName => "SETNAME",
        /// Bitwise OR
        BitOr => "BITOR",
        /// Bitwise XOR
        BitXor => "BITXOR",
        /// Bitwise AND
        BitAnd => "BITAND",
        /// Equality (`==`)
        Eq => "EQ",
        /// Inequality (`!=`)
        Ne => "NE",
        /// Less than
        Lt => "LT",
        /// Less than or equal
        Le => "LE",
        /// Greater than
        Gt => "GT",
        /// Greater than or equal
        Ge => "GE",
        /// Left shift
        Lsh => "LSH",
        /// Signed right shift
        Rsh => "RSH",
        /// Unsigned right shift
        Ursh => "URSH",
        /// Addition or concatenation
        Add => "ADD",
        /// Subtraction
        Sub => "SUB",
        /// Multiplication
        Mul => "MUL",
        /// Division
        Div => "DIV",
        /// Remainder
        Mod => "MOD",
        /// Logical NOT
        Not => "NOT",
        /// Bitwise NOT
        BitNot => "BITNOT",
        /// Unary plus
        Pos => "POS",
        /// Unary minus
        Neg => "NEG",
        /// Constructor call
        New => "NEW",
        /// Property deletion
        DelProp => "DELPROP",
        /// `typeof` operator
        TypeOf => "TYPEOF",
        /// Named property read
        GetProp => "GETPROP",
        /// Named property write
        SetProp => "SETPROP",
        /// Computed property read
        GetElem => "GETELEM",
        /// Computed property write
        SetElem => "SETELEM",
        /// Function call
        Call => "CALL",
        /// Scope chain lookup
        Name => "NAME",
        /// Number literal
        Number => "NUMBER",
        /// String literal
        String => "STRING",
        /// The number zero
        Zero => "ZERO",
        /// The number one
        One => "ONE",
        /// `null`
        Null => "NULL",
        /// `this`
        This => "THIS",
        /// `false`
        False => "FALSE",
        /// `true`
        True => "TRUE",
        /// Strict equality
        ShEq => "SHEQ",
        /// Strict inequality
        ShNe => "SHNE",
        /// Regular expression literal
        RegExp => "REGEXP",
        /// Discard the top of the stack
        Pop => "POP",
        /// Find the scope object that holds a name
        BindName => "BINDNAME",
        /// Throw the top of the stack
        Throw => "THROW",
        /// `in` operator
        In => "IN",
        /// `instanceof` operator
        InstanceOf => "INSTANCEOF",
        /// Read a local slot
        GetVar => "GETVAR",
        /// Write a local slot
        SetVar => "SETVAR",
        /// `undefined`
        Undefined => "UNDEFINED",
        /// Create the scope object of a catch clause
        CatchScope => "CATCH_SCOPE",
        /// Start a for-in enumeration
        EnumInit => "ENUM_INIT",
        /// Advance a for-in enumeration
        EnumNext => "ENUM_NEXT",
        /// Current for-in key
        EnumId => "ENUM_ID",
        /// The function object being executed
        ThisFn => "THISFN",
        /// Return the value stored by a preceding POPV
        ReturnPopv => "RETURN_POPV",
        /// Call a finally block as a subroutine
        Jsr => "JSR",
        /// Return from a finally subroutine
        Retsub => "RETSUB",
        /// No operation
        Nop => "NOP",
    }
    parse {
        /// `try` statement
        Try => "TRY",
        /// `;`
        Semi => "SEMI",
        /// `[`
        Lb => "LB",
        /// `]`
        Rb => "RB",
        /// `{`
        Lc => "LC",
        /// `}`
        Rc => "RC",
        /// `(`
        Lp => "LP",
        /// `)`
        Rp => "RP",
        /// `,`
        Comma => "COMMA",
        /// `=`
        Assign => "ASSIGN",
        /// `?`
        Hook => "HOOK",
        /// `:`
        Colon => "COLON",
        /// `||`
        Or => "OR",
        /// `&&`
        And => "AND",
        /// `++`
        Inc => "INC",
        /// `--`
        Dec => "DEC",
        /// `.`
        Dot => "DOT",
        /// `function`
        Function => "FUNCTION",
        /// `if`
        If => "IF",
        /// `else`
        Else => "ELSE",
        /// `switch`
        Switch => "SWITCH",
        /// `case`
        Case => "CASE",
        /// `default`
        Default => "DEFAULT",
        /// `while`
        While => "WHILE",
        /// `do`
        Do => "DO",
        /// `for`
        For => "FOR",
        /// `break`
        Break => "BREAK",
        /// `continue`
        Continue => "CONTINUE",
        /// `var`
        Var => "VAR",
        /// `with` body
        With => "WITH",
        /// `catch`
        Catch => "CATCH",
        /// `finally`
        Finally => "FINALLY",
        /// `void`
        Void => "VOID",
        /// Statement list
        Block => "BLOCK",
        /// Statement label
        Label => "LABEL",
        /// Jump destination
        Target => "TARGET",
        /// Loop statement
        Loop => "LOOP",
        /// Expression statement
        ExprStmt => "EXPRSTMT",
        /// Top-level script
        Script => "SCRIPT",
        /// Block owning interpreter locals
        LocalBlock => "LOCAL_BLOCK",
        /// Object literal
        ObjectLit => "OBJECTLIT",
        /// Array literal
        ArrayLit => "ARRAYLIT",
        /// End of a for-in enumeration
        EnumDone => "ENUM_DONE",
    }
}

impl Token {
    /// First token of the bytecode range.
    pub const FIRST_BYTECODE: Token = Token::Popv;
    /// Last token of the bytecode range.
    pub const LAST_BYTECODE: Token = Token::Nop;

    /// Returns true if this token can be emitted as an interpreter opcode.
    pub fn is_bytecode(self) -> bool {
        (Self::FIRST_BYTECODE..=Self::LAST_BYTECODE).contains(&self)
    }

    /// The numeric value of this token.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a token from its numeric value.
    pub fn from_u8(value: u8) -> Option<Token> {
        Self::ALL.get(value as usize).copied()
    }

    /// Decodes an opcode, rejecting tokens outside the bytecode range.
    pub fn from_opcode(value: u8) -> Option<Token> {
        Self::from_u8(value).filter(|t| t.is_bytecode())
    }

    /// Returns true for kinds that carry jump targets after lowering.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Token::Goto
                | Token::IfEq
                | Token::IfNe
                | Token::Jsr
                | Token::Loop
                | Token::Label
                | Token::Break
                | Token::Continue
                | Token::Try
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown token name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown token name '{0}'")]
pub struct UnknownToken(pub String);

impl FromStr for Token {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownToken(s.to_string()))
    }
}
