use super::expression::{Expression, FunctionDef, Param, Statement};
use crate::error::ScriptError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Symbol(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) => format!("'{}'", s),
            Token::Ident(s) => s.clone(),
            Token::Symbol(s) => format!("'{}'", s),
        }
    }
}

// Longest symbols first so that `**` wins over `*`.
const SYMBOLS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[",
    "]", "{", "}", ",", ":", ".",
];

struct Line {
    number: usize,
    indent: usize,
    tokens: Vec<Token>,
}

fn tokenize_line(number: usize, text: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '#' {
            break;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            let mut is_float = false;
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                is_float = true;
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let literal: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let token = if is_float {
                literal.parse().map(Token::Float).ok()
            } else {
                literal.parse().map(Token::Int).ok()
            };
            tokens.push(token.ok_or(ScriptError::UnexpectedChar { line: number, found: c })?);
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(ScriptError::UnterminatedString { line: number }),
                    Some(&ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars
                            .get(i + 1)
                            .ok_or(ScriptError::UnterminatedString { line: number })?;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            other => *other,
                        });
                        i += 2;
                    }
                    Some(&ch) => {
                        value.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(value));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let symbol = SYMBOLS
                .iter()
                .find(|s| rest.starts_with(**s))
                .ok_or(ScriptError::UnexpectedChar { line: number, found: c })?;
            i += symbol.chars().count();
            tokens.push(Token::Symbol(*symbol));
        }
    }
    Ok(tokens)
}

fn split_lines(source: &str) -> Result<Vec<Line>, ScriptError> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let tokens = tokenize_line(number, raw)?;
        if tokens.is_empty() {
            continue;
        }
        let indent = raw
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum();
        lines.push(Line {
            number,
            indent,
            tokens,
        });
    }
    Ok(lines)
}

/// Parses every `def` block in `source`. Top-level imports are accepted and ignored.
pub fn parse_functions(source: &str) -> Result<Vec<FunctionDef>, ScriptError> {
    let lines = split_lines(source)?;
    let mut functions = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        match line.tokens.first() {
            Some(Token::Ident(kw)) if kw == "import" || kw == "from" => {
                i += 1;
            }
            Some(Token::Ident(kw)) if kw == "def" => {
                let mut parser = Parser::new(&line.tokens, line.number);
                let (mut function, inline_body) = parser.function_header()?;
                if let Some(statement) = inline_body {
                    function.body.push(statement);
                }
                i += 1;
                while i < lines.len() && lines[i].indent > line.indent {
                    let body_line = &lines[i];
                    let mut parser = Parser::new(&body_line.tokens, body_line.number);
                    function.body.push(parser.statement()?);
                    i += 1;
                }
                functions.push(function);
            }
            Some(token) => {
                return Err(ScriptError::UnexpectedToken {
                    line: line.number,
                    expected: "'def'".to_string(),
                    found: token.describe(),
                });
            }
            None => i += 1,
        }
    }
    Ok(functions)
}

/// Parses a standalone expression, used for argument defaults and tests.
pub fn parse_expression(text: &str) -> Result<Expression, ScriptError> {
    let tokens = tokenize_line(1, text)?;
    let mut parser = Parser::new(&tokens, 1);
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn error(&self, expected: &str) -> ScriptError {
        ScriptError::UnexpectedToken {
            line: self.line,
            expected: expected.to_string(),
            found: self
                .peek()
                .map(Token::describe)
                .unwrap_or_else(|| "end of line".to_string()),
        }
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == keyword)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.at_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ScriptError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(&format!("'{}'", symbol)))
        }
    }

    fn identifier(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(self.error("an identifier")),
        }
    }

    fn finish(&self) -> Result<(), ScriptError> {
        if self.pos < self.tokens.len() {
            Err(self.error("end of line"))
        } else {
            Ok(())
        }
    }

    /// `def name(a, b=1):` with an optional statement after the colon.
    fn function_header(&mut self) -> Result<(FunctionDef, Option<Statement>), ScriptError> {
        self.pos += 1; // `def`
        let name = self.identifier()?;
        self.expect_symbol("(")?;
        let mut params = Vec::new();
        while !self.at_symbol(")") {
            let param = self.identifier()?;
            if self.eat_symbol(":") {
                self.skip_annotation();
            }
            let default = if self.eat_symbol("=") {
                Some(self.expression()?)
            } else {
                None
            };
            params.push(Param {
                name: param,
                default,
            });
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol(")")?;
        // Return annotations are tolerated and ignored.
        if self.eat_symbol("-") {
            self.expect_symbol(">")?;
            while self.peek().is_some() && !self.at_symbol(":") {
                self.pos += 1;
            }
        }
        self.expect_symbol(":")?;
        let inline_body = if self.peek().is_some() {
            Some(self.statement()?)
        } else {
            None
        };
        Ok((
            FunctionDef {
                name,
                params,
                body: Vec::new(),
            },
            inline_body,
        ))
    }

    /// Skips a parameter annotation such as `int` or `list[float]`.
    fn skip_annotation(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Symbol("[") | Token::Symbol("(") => depth += 1,
                Token::Symbol("]") | Token::Symbol(")") if depth > 0 => depth -= 1,
                Token::Symbol(",") | Token::Symbol("=") | Token::Symbol(")") if depth == 0 => {
                    return;
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn statement(&mut self) -> Result<Statement, ScriptError> {
        let statement = if self.at_keyword("return") {
            self.pos += 1;
            if self.peek().is_none() {
                Statement::Return(None)
            } else {
                Statement::Return(Some(self.expression()?))
            }
        } else if matches!(
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
            (Some(Token::Ident(_)), Some(Token::Symbol("=")))
        ) {
            let target = self.identifier()?;
            self.pos += 1; // `=`
            Statement::Assign(target, self.expression()?)
        } else {
            Statement::Expr(self.expression()?)
        };
        self.finish()?;
        Ok(statement)
    }

    fn expression(&mut self) -> Result<Expression, ScriptError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expression, ScriptError> {
        let mut left = self.and_expr()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expression, ScriptError> {
        let mut left = self.not_expr()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let right = self.not_expr()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expression, ScriptError> {
        if self.at_keyword("not") {
            self.pos += 1;
            return Ok(Expression::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expression, ScriptError> {
        let left = self.additive()?;
        let build: fn(Box<Expression>, Box<Expression>) -> Expression = match self.peek() {
            Some(Token::Symbol("==")) => Expression::Equal,
            Some(Token::Symbol("!=")) => Expression::NotEqual,
            Some(Token::Symbol(">")) => Expression::GreaterThan,
            Some(Token::Symbol(">=")) => Expression::GreaterThanOrEqual,
            Some(Token::Symbol("<")) => Expression::SmallerThan,
            Some(Token::Symbol("<=")) => Expression::SmallerThanOrEqual,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(build(Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expression, ScriptError> {
        let mut left = self.term()?;
        loop {
            let build: fn(Box<Expression>, Box<Expression>) -> Expression = match self.peek() {
                Some(Token::Symbol("+")) => Expression::Sum,
                Some(Token::Symbol("-")) => Expression::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = build(Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expression, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let build: fn(Box<Expression>, Box<Expression>) -> Expression = match self.peek() {
                Some(Token::Symbol("*")) => Expression::Multiply,
                Some(Token::Symbol("/")) => Expression::Divide,
                Some(Token::Symbol("//")) => Expression::FloorDivide,
                Some(Token::Symbol("%")) => Expression::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = build(Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expression, ScriptError> {
        if self.eat_symbol("-") {
            return Ok(Expression::Negate(Box::new(self.unary()?)));
        }
        if self.eat_symbol("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expression, ScriptError> {
        let base = self.postfix()?;
        if self.eat_symbol("**") {
            // Right associative, and binds tighter than a unary minus on its left.
            let exponent = self.unary()?;
            return Ok(Expression::Power(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expression, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_symbol("[") {
                let index = self.expression()?;
                self.expect_symbol("]")?;
                expr = Expression::Index(Box::new(expr), Box::new(index));
            } else if self.at_symbol("(") {
                let name = match expr {
                    Expression::Variable(name) => name,
                    _ => return Err(self.error("a callable name")),
                };
                self.pos += 1;
                let args = self.sequence(")")?;
                expr = Expression::Call(name, args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: &str) -> Result<Vec<Expression>, ScriptError> {
        let mut items = Vec::new();
        while !self.at_symbol(close) {
            items.push(self.expression()?);
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol(close)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expression, ScriptError> {
        let token = self.advance().ok_or_else(|| ScriptError::UnexpectedToken {
            line: self.line,
            expected: "an expression".to_string(),
            found: "end of line".to_string(),
        })?;
        match token {
            Token::Int(i) => Ok(Expression::Literal(Value::Int(*i))),
            Token::Float(f) => Ok(Expression::Literal(Value::Float(*f))),
            Token::Str(s) => Ok(Expression::Literal(Value::Text(s.clone()))),
            Token::Ident(name) => Ok(match name.as_str() {
                "True" => Expression::Literal(Value::Bool(true)),
                "False" => Expression::Literal(Value::Bool(false)),
                "None" => Expression::Literal(Value::Null),
                _ => Expression::Variable(name.clone()),
            }),
            Token::Symbol("(") => {
                let inner = self.expression()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Token::Symbol("[") => Ok(Expression::List(self.sequence("]")?)),
            Token::Symbol("{") => {
                let mut entries = Vec::new();
                while !self.at_symbol("}") {
                    let key = self.expression()?;
                    self.expect_symbol(":")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat_symbol(",") {
                        break;
                    }
                }
                self.expect_symbol("}")?;
                Ok(Expression::Map(entries))
            }
            other => {
                self.pos -= 1;
                Err(ScriptError::UnexpectedToken {
                    line: self.line,
                    expected: "an expression".to_string(),
                    found: other.describe(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiline_function() {
        let source = "import math\n\ndef double(v, factor=2):\n    # scale it\n    out = v * factor\n    return out\n";
        let functions = parse_functions(source).unwrap();
        assert_eq!(functions.len(), 1);
        let f = &functions[0];
        assert_eq!(f.name, "double");
        assert_eq!(f.params[1].default, Some(Expression::Literal(Value::Int(2))));
        assert_eq!(f.body.len(), 2);
    }

    #[test]
    fn parses_one_liner_and_annotations() {
        let functions = parse_functions("def neg(x: float) -> float: return -x").unwrap();
        assert_eq!(functions[0].params[0].name, "x");
        assert_eq!(
            functions[0].body,
            vec![Statement::Return(Some(Expression::Negate(Box::new(
                Expression::Variable("x".into())
            ))))]
        );
    }

    #[test]
    fn precedence_is_conventional() {
        let expr = parse_expression("1 + 2 * 3 > 6 and not False").unwrap();
        assert!(matches!(expr, Expression::And(_, _)));
        let expr = parse_expression("-2 ** 2").unwrap();
        assert!(matches!(expr, Expression::Negate(_)));
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_functions("def f(x):\n    return x +\n").unwrap_err();
        assert!(matches!(err, ScriptError::UnexpectedToken { line: 2, .. }));
        let err = parse_functions("def f(x):\n    return 'open\n").unwrap_err();
        assert_eq!(err, ScriptError::UnterminatedString { line: 2 });
    }

    #[test]
    fn rejects_top_level_statements() {
        assert!(parse_functions("x = 1").is_err());
    }
}
