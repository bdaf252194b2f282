//! `fail-if` / `warn-if` rules
//!
//! Rules are expressions over setting values:
//!
//! ```text
//! namelist:foo=bar > 2 * namelist:foo=baz and this != "off"
//! len(this) < 3 or any(namelist:foo=list == 0)
//! this(2) >= 1e-3
//! ```
//!
//! Setting ids stand for their value, `this` for the value of the setting the rule belongs to and `id(N)` for
//! the N-th element of an array value. Values that parse as numbers are numbers, everything else is a string.
//! Numbers compare less than strings.
//!
//! A rule that refers to a setting without a value cannot be evaluated. [RuleError::Value] tells callers to skip
//! it.
use super::{get_id_from_section_option, get_metadata_for_config_id, get_section_option_from_id, strip_id, MacroReport, Validator};
use crate::config::ConfigNode;
use crate::meta_prop;
use crate::meta_type::parse_real;
use crate::variable::array_split;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

/// Matches expressions that use `this` with an operator, as opposed to plain values
pub static RE_EXPR_IS_THIS_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:^.*[^\w:=]|^)
        this
        (?:
            $
          | \W .* ( [+*%<>=-] | in\s | not\s | and\s | or\s ) .* $
        )",
    )
    .expect("valid regex")
});

/// Longest string a rule may build by repetition
pub const MAX_REPEAT_LEN: usize = 1 << 20;

static RE_CONFIG_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A[\w:.]*(?:\{.*?\})?(?:\([^)]*\))?=[a-zA-Z][\w-]+(?:\(\d+\))?").expect("valid regex")
});
static RE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(?:\d+\.?\d*|\.\d+)(?:[edED][-+]?\d+)?").expect("valid regex"));
static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\A[A-Za-z_]\w*").expect("valid regex"));
static RE_THIS_ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\Athis\((\d+)\)").expect("valid regex"));
static RE_RULE_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*;\s*").expect("valid regex"));

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// A referenced setting has no value
    #[error("{0} - could not retrieve value. ")]
    Value(String),
    #[error("{0}")]
    Syntax(String),
    /// Type mismatches and division by zero
    #[error("{0}")]
    Eval(String),
}

fn syntax(message: impl Into<String>) -> RuleError {
    RuleError::Syntax(message.into())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Bool(bool),
    Setting(SettingRef),
    Word(&'static str),
    Op(&'static str),
}

const KEYWORDS: [&str; 6] = ["and", "or", "not", "in", "len", "any"];
const OPERATORS: [&str; 18] = [
    "**", "//", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "(", ")", "[", "]", ",",
];

fn tokenize(rule: &str) -> Result<Vec<Token>, RuleError> {
    let mut tokens = vec![];
    let mut rest = rule.trim_start();
    while !rest.is_empty() {
        let (token, len) = if let Some(quote @ ('"' | '\'')) = rest.chars().next() {
            let end = rest[1..]
                .find(quote)
                .ok_or_else(|| syntax(format!("unterminated string: {rest}")))?;
            (Token::Str(rest[1..end + 1].to_string()), end + 2)
        } else if let Some(m) = RE_THIS_ELEMENT.captures(rest) {
            (Token::Setting(SettingRef::ThisElement(m[1].to_string())), m[0].len())
        } else if let Some(m) = RE_CONFIG_ID.find(rest) {
            (Token::Setting(SettingRef::Id(m.as_str().to_string())), m.len())
        } else if let Some(m) = RE_NUMBER.find(rest) {
            let number = m.as_str().replace(['d', 'D'], "e");
            let number = number
                .parse::<f64>()
                .map_err(|_| syntax(format!("bad number: {}", m.as_str())))?;
            (Token::Num(number), m.len())
        } else if let Some(m) = RE_WORD.find(rest) {
            let token = match m.as_str() {
                "this" => Token::Setting(SettingRef::This),
                "True" => Token::Bool(true),
                "False" => Token::Bool(false),
                "all" => Token::Word("all"),
                word => match KEYWORDS.iter().find(|keyword| **keyword == word) {
                    Some(keyword) => Token::Word(keyword),
                    None => return Err(syntax(format!("unknown name: {word}"))),
                },
            };
            (token, m.len())
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            (Token::Op(op), op.len())
        } else {
            return Err(syntax(format!("unexpected character: {rest}")));
        };
        tokens.push(token);
        rest = rest[len..].trim_start();
    }
    Ok(tokens)
}

/// A reference to a setting value
#[derive(Debug, Clone, PartialEq)]
enum SettingRef {
    This,
    ThisElement(String),
    Id(String),
}

impl SettingRef {
    fn id(&self, setting_id: &str) -> String {
        match self {
            SettingRef::This => setting_id.to_string(),
            SettingRef::ThisElement(index) => format!("{setting_id}({index})"),
            SettingRef::Id(id) => id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Val),
    Setting(SettingRef),
    Len(SettingRef),
    Quantified {
        all: bool,
        setting: SettingRef,
        op: CmpOp,
        rhs: Box<Expr>,
    },
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

impl Expr {
    fn settings<'e>(&'e self, out: &mut Vec<&'e SettingRef>) {
        match self {
            Expr::Lit(_) => {}
            Expr::Setting(setting) | Expr::Len(setting) => out.push(setting),
            Expr::Quantified { setting, rhs, .. } => {
                out.push(setting);
                rhs.settings(out);
            }
            Expr::List(items) => items.iter().for_each(|item| item.settings(out)),
            Expr::Neg(expr) | Expr::Not(expr) => expr.settings(out),
            Expr::Binary(_, lhs, rhs) | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.settings(out);
                rhs.settings(out);
            }
            Expr::Compare(first, rest) => {
                first.settings(out);
                rest.iter().for_each(|(_, expr)| expr.settings(out));
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_is(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_is(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), RuleError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(syntax(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Expr, RuleError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Word("or")) {
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, RuleError> {
        let mut lhs = self.not()?;
        while self.eat(&Token::Word("and")) {
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, RuleError> {
        if self.eat(&Token::Word("not")) {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek()? {
            Token::Op("==") => CmpOp::Eq,
            Token::Op("!=") => CmpOp::Ne,
            Token::Op("<") => CmpOp::Lt,
            Token::Op("<=") => CmpOp::Le,
            Token::Op(">") => CmpOp::Gt,
            Token::Op(">=") => CmpOp::Ge,
            Token::Word("in") => CmpOp::In,
            Token::Word("not") if self.tokens.get(self.pos + 1) == Some(&Token::Word("in")) => {
                self.pos += 1;
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, RuleError> {
        let first = self.arith()?;
        let mut rest = vec![];
        while let Some(op) = self.cmp_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr, RuleError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinOp::Add,
                Some(Token::Op("-")) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr, RuleError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinOp::Mul,
                Some(Token::Op("/")) => BinOp::Div,
                Some(Token::Op("//")) => BinOp::FloorDiv,
                Some(Token::Op("%")) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.factor()?));
        }
    }

    fn factor(&mut self) -> Result<Expr, RuleError> {
        if self.eat(&Token::Op("-")) {
            return Ok(Expr::Neg(Box::new(self.factor()?)));
        }
        if self.eat(&Token::Op("+")) {
            return self.factor();
        }
        let base = self.atom()?;
        if self.eat(&Token::Op("**")) {
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(self.factor()?)));
        }
        Ok(base)
    }

    fn setting(&mut self) -> Result<SettingRef, RuleError> {
        match self.next() {
            Some(Token::Setting(setting)) => Ok(setting),
            other => Err(syntax(format!("expected a setting, found {other:?}"))),
        }
    }

    fn atom(&mut self) -> Result<Expr, RuleError> {
        match self.next() {
            Some(Token::Num(number)) => Ok(Expr::Lit(Val::Num(number))),
            Some(Token::Str(text)) => Ok(Expr::Lit(Val::Str(text))),
            Some(Token::Bool(value)) => Ok(Expr::Lit(Val::Bool(value))),
            Some(Token::Setting(setting)) => Ok(Expr::Setting(setting)),
            Some(Token::Op("(")) => {
                let expr = self.or()?;
                self.expect(&Token::Op(")"))?;
                Ok(expr)
            }
            Some(Token::Op("[")) => {
                let mut items = vec![];
                while !self.eat(&Token::Op("]")) {
                    items.push(self.or()?);
                    if !self.eat(&Token::Op(",")) {
                        self.expect(&Token::Op("]"))?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::Word("len")) => {
                self.expect(&Token::Op("("))?;
                let setting = self.setting()?;
                self.expect(&Token::Op(")"))?;
                Ok(Expr::Len(setting))
            }
            Some(Token::Word(word @ ("any" | "all"))) => {
                self.expect(&Token::Op("("))?;
                let setting = self.setting()?;
                let op = self
                    .cmp_op()
                    .ok_or_else(|| syntax(format!("{word}() needs a comparison")))?;
                let rhs = self.arith()?;
                self.expect(&Token::Op(")"))?;
                Ok(Expr::Quantified {
                    all: word == "all",
                    setting,
                    op,
                    rhs: Box::new(rhs),
                })
            }
            other => Err(syntax(format!("unexpected {other:?}"))),
        }
    }
}

fn parse_rule(rule: &str) -> Result<Expr, RuleError> {
    if rule.starts_with("{%") || rule.starts_with("{-%") {
        return Err(syntax("template rules are not supported"));
    }
    let mut parser = Parser {
        tokens: tokenize(rule)?,
        pos: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(syntax(format!("unexpected {token:?}"))),
    }
}

/// A value during evaluation
#[derive(Debug, Clone, PartialEq)]
enum Val {
    Num(f64),
    Str(String),
    Bool(bool),
    List(Vec<Val>),
}

impl Val {
    /// Numbers are numbers, everything else is a string
    fn from_setting(value: &str) -> Val {
        match parse_real(value) {
            Some(number) => Val::Num(number),
            None => Val::Str(value.to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Val::Num(_) => "float",
            Val::Str(_) => "str",
            Val::Bool(_) => "bool",
            Val::List(_) => "list",
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Val::Num(number) => Some(*number),
            Val::Bool(value) => Some(f64::from(u8::from(*value))),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Val::Num(number) => *number != 0.0,
            Val::Str(text) => !text.is_empty(),
            Val::Bool(value) => *value,
            Val::List(items) => !items.is_empty(),
        }
    }

    fn eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.eq(b)),
            (a, b) => match (a.number(), b.number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    fn unorderable(&self, op: &str, other: &Val) -> RuleError {
        RuleError::Eval(format!(
            "'{op}' not supported between instances of '{}' and '{}'",
            self.type_name(),
            other.type_name()
        ))
    }

    fn lt(&self, other: &Val) -> Result<bool, RuleError> {
        match (self, other) {
            (Val::Str(a), Val::Str(b)) => Ok(a < b),
            (Val::Str(_), b) if b.number().is_some() => Ok(false),
            (a, Val::Str(b)) if a.number().is_some() => Ok(parse_real(b).map_or(true, |b| a.number() < Some(b))),
            (a, b) => match (a.number(), b.number()) {
                (Some(a), Some(b)) => Ok(a < b),
                _ => Err(self.unorderable("<", other)),
            },
        }
    }

    fn gt(&self, other: &Val) -> Result<bool, RuleError> {
        match (self, other) {
            (Val::Str(a), Val::Str(b)) => Ok(a > b),
            (Val::Str(_), b) if b.number().is_some() => Ok(true),
            (a, Val::Str(b)) if a.number().is_some() => Ok(parse_real(b).is_some_and(|b| a.number() > Some(b))),
            (a, b) => match (a.number(), b.number()) {
                (Some(a), Some(b)) => Ok(a > b),
                _ => Err(self.unorderable(">", other)),
            },
        }
    }

    fn contained_in(&self, other: &Val) -> Result<bool, RuleError> {
        match (self, other) {
            (Val::Str(needle), Val::Str(haystack)) => Ok(haystack.contains(needle.as_str())),
            (needle, Val::Str(_)) => Err(RuleError::Eval(format!(
                "'in <string>' requires string as left operand, not {}",
                needle.type_name()
            ))),
            (needle, Val::List(items)) => Ok(items.iter().any(|item| item.eq(needle))),
            (_, other) => Err(RuleError::Eval(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    fn compare(&self, op: CmpOp, other: &Val) -> Result<bool, RuleError> {
        match op {
            CmpOp::Eq => Ok(self.eq(other)),
            CmpOp::Ne => Ok(!self.eq(other)),
            CmpOp::Lt => self.lt(other),
            CmpOp::Le => self.gt(other).map(|gt| !gt),
            CmpOp::Gt => self.gt(other),
            CmpOp::Ge => self.lt(other).map(|lt| !lt),
            CmpOp::In => self.contained_in(other),
            CmpOp::NotIn => self.contained_in(other).map(|found| !found),
        }
    }

    fn binary(&self, op: BinOp, other: &Val) -> Result<Val, RuleError> {
        let symbol = match op {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        };
        let unsupported = || {
            RuleError::Eval(format!(
                "unsupported operand type(s) for {symbol}: '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))
        };

        match (op, self, other) {
            (BinOp::Add, Val::Str(a), Val::Str(b)) => return Ok(Val::Str(format!("{a}{b}"))),
            (BinOp::Add, Val::List(a), Val::List(b)) => {
                return Ok(Val::List(a.iter().chain(b).cloned().collect()))
            }
            (BinOp::Mul, Val::Str(text), count) | (BinOp::Mul, count, Val::Str(text)) => {
                return match count.number() {
                    Some(n) if n.fract() == 0.0 => repeat(text, n),
                    _ => Err(unsupported()),
                }
            }
            _ => {}
        }

        let (Some(a), Some(b)) = (self.number(), other.number()) else {
            return Err(unsupported());
        };
        let zero_division = |what: &str| RuleError::Eval(format!("float {what} by zero"));
        let number = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div if b == 0.0 => return Err(zero_division("division")),
            BinOp::Div => a / b,
            BinOp::FloorDiv if b == 0.0 => return Err(zero_division("floor division")),
            BinOp::FloorDiv => (a / b).floor(),
            BinOp::Mod if b == 0.0 => return Err(zero_division("modulo")),
            BinOp::Mod => a - b * (a / b).floor(),
            BinOp::Pow => a.powf(b),
        };
        Ok(Val::Num(number))
    }
}

/// Evaluates rules against a configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEvaluator;

struct Scope<'a> {
    setting_id: &'a str,
    config: &'a ConfigNode,
    meta_config: &'a ConfigNode,
}

impl Scope<'_> {
    /// Raw value of the setting `setting`
    ///
    /// Settings of duplicate sections are looked up in the section of the rule's own setting.
    fn raw_value(&self, setting: &SettingRef) -> Result<String, RuleError> {
        let variable_id = setting.id(self.setting_id);
        let missing = || RuleError::Value(variable_id.clone());
        let (section, option) = get_section_option_from_id(&variable_id);
        let mut section = section.to_string();

        if variable_id != self.setting_id {
            let dupl_section = strip_id(&section);
            let is_duplicate = self
                .meta_config
                .get(&[dupl_section.as_str(), meta_prop::DUPLICATE], true)
                .and_then(ConfigNode::as_leaf)
                == Some(meta_prop::VALUE_TRUE);
            if is_duplicate {
                let parent_section = get_section_option_from_id(self.setting_id).0;
                if strip_id(parent_section) != dupl_section {
                    return Err(missing());
                }
                section = parent_section.to_string();
            }
        }

        let option = option.ok_or_else(missing)?;
        if let Some(node) = self.config.get(&[section.as_str(), option], true) {
            return node.as_leaf().map(str::to_string).ok_or_else(missing);
        }

        // a single array element: `option(N)`
        if option.ends_with(')') && option.matches('(').count() == 1 {
            let (option, element) = option
                .trim_end_matches(')')
                .split_once('(')
                .ok_or_else(missing)?;
            let value = self
                .config
                .get(&[section.as_str(), option], false)
                .and_then(ConfigNode::as_leaf)
                .ok_or_else(missing)?;
            let index: usize = element.trim().parse().map_err(|_| missing())?;
            let elements = array_split(value);
            return index
                .checked_sub(1)
                .and_then(|i| elements.get(i))
                .cloned()
                .ok_or_else(missing);
        }
        Err(missing())
    }

    fn eval(&self, expr: &Expr) -> Result<Val, RuleError> {
        Ok(match expr {
            Expr::Lit(value) => value.clone(),
            Expr::Setting(setting) => Val::from_setting(&self.raw_value(setting)?),
            Expr::Len(setting) => Val::Num(array_split(&self.raw_value(setting)?).len() as f64),
            Expr::Quantified { all, setting, op, rhs } => {
                let rhs = self.eval(rhs)?;
                let elements = array_split(&self.raw_value(setting)?);
                let mut result = !elements.is_empty() && *all;
                for element in &elements {
                    let matched = Val::from_setting(element).compare(*op, &rhs)?;
                    if matched != *all {
                        result = matched;
                        break;
                    }
                }
                Val::Bool(result)
            }
            Expr::List(items) => Val::List(items.iter().map(|item| self.eval(item)).collect::<Result<_, _>>()?),
            Expr::Neg(expr) => match self.eval(expr)? {
                value if value.number().is_some() => Val::Num(-value.number().unwrap_or_default()),
                value => {
                    return Err(RuleError::Eval(format!(
                        "bad operand type for unary -: '{}'",
                        value.type_name()
                    )))
                }
            },
            Expr::Not(expr) => Val::Bool(!self.eval(expr)?.truthy()),
            Expr::Binary(op, lhs, rhs) => self.eval(lhs)?.binary(*op, &self.eval(rhs)?)?,
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() {
                    self.eval(rhs)?
                } else {
                    lhs
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() {
                    lhs
                } else {
                    self.eval(rhs)?
                }
            }
            Expr::Compare(first, rest) => {
                let mut lhs = self.eval(first)?;
                for (op, expr) in rest {
                    let rhs = self.eval(expr)?;
                    if !lhs.compare(*op, &rhs)? {
                        return Ok(Val::Bool(false));
                    }
                    lhs = rhs;
                }
                Val::Bool(true)
            }
        })
    }
}

impl RuleEvaluator {
    /// Evaluate `rule` for the setting `setting_id`
    ///
    /// Every setting the rule refers to must have a value, even in branches that are not evaluated.
    pub fn evaluate_rule(
        &self,
        rule: &str,
        setting_id: &str,
        config: &ConfigNode,
        meta_config: &ConfigNode,
    ) -> Result<bool, RuleError> {
        let expr = parse_rule(rule)?;
        let scope = Scope {
            setting_id,
            config,
            meta_config,
        };

        let mut settings = vec![&SettingRef::This];
        expr.settings(&mut settings);
        for setting in settings {
            scope.raw_value(setting)?;
        }

        let result = scope.eval(&expr)?.truthy();
        tracing::trace!(rule, setting_id, result, "evaluated rule");
        Ok(result)
    }
}

const RULE_ERROR_NAME: &str = meta_prop::FAIL_IF;
const RULE_WARNING_NAME: &str = meta_prop::WARN_IF;

/// Checks `fail-if` and `warn-if` rules
///
/// A rule that evaluates to true is reported, as an error for `fail-if` and as a warning for `warn-if`. Text after
/// `#` on a rule line is used as the message of the last rule on that line.
#[derive(Debug, Default, Clone)]
pub struct FailureRuleChecker;

impl Validator for FailureRuleChecker {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        let evaluator = RuleEvaluator;

        let mut rule_data: [(&str, IndexMap<String, Vec<(String, Option<String>)>>); 2] =
            [(RULE_ERROR_NAME, IndexMap::new()), (RULE_WARNING_NAME, IndexMap::new())];
        for (keys, node) in config.walk::<&str>(&[], true) {
            if node.as_leaf().is_none() {
                continue;
            }
            let setting_id = get_id_from_section_option(&keys[0], Some(&keys[1]));
            let metadata = get_metadata_for_config_id(&setting_id, meta_config);
            for (rule_opt, id_rules) in rule_data.iter_mut() {
                let Some(rule) = metadata.get(*rule_opt) else {
                    continue;
                };
                let rules = id_rules.entry(setting_id.clone()).or_default();
                for rule_line in rule.lines() {
                    let (rule_line, message) = match rule_line.split_once('#') {
                        Some((line, message)) => (line, Some(message.trim().to_string())),
                        None => (rule_line, None),
                    };
                    for rule_item in RE_RULE_SPLIT.split(rule_line.trim()) {
                        if !rule_item.is_empty() {
                            rules.push((rule_item.to_string(), None));
                        }
                    }
                    if let Some(last) = rules.last_mut() {
                        last.1 = message;
                    }
                }
            }
        }

        for (rule_type, id_rules) in &rule_data {
            let is_warning = *rule_type == RULE_WARNING_NAME;
            let f_type = if is_warning { "warn because" } else { "failed because" };
            for (setting_id, rules) in id_rules {
                let (section, option) = get_section_option_from_id(setting_id);
                for (rule, message) in rules {
                    let info = match evaluator.evaluate_rule(rule, setting_id, config, meta_config) {
                        Ok(false) => continue,
                        Err(RuleError::Value(_)) => continue,
                        Ok(true) => match message {
                            Some(message) => format!("({message}) {f_type}: {rule}"),
                            None => format!("{f_type}: {rule}"),
                        },
                        Err(RuleError::Eval(error)) => format!("({error}) {f_type}: {rule}"),
                        Err(RuleError::Syntax(error)) => format!("Syntax error ({rule_type}) {rule}: {error}"),
                    };
                    let value = config
                        .get(&[section, option.unwrap_or_default()], false)
                        .and_then(ConfigNode::as_leaf);
                    reports.push(MacroReport {
                        is_warning,
                        ..MacroReport::new(section, option, value, info)
                    });
                }
            }
        }
        reports
    }
}

/// `text * count`, refusing results longer than [MAX_REPEAT_LEN] bytes
fn repeat(text: &str, count: f64) -> Result<Val, RuleError> {
    let count = count.max(0.0);
    let len = (count <= MAX_REPEAT_LEN as f64)
        .then(|| text.len().checked_mul(count as usize))
        .flatten()
        .filter(|len| *len <= MAX_REPEAT_LEN);
    match len {
        Some(_) => Ok(Val::Str(text.repeat(count as usize))),
        None => Err(RuleError::Eval(format!("repeated string too long: {count} times"))),
    }
}
