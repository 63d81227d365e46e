//! nom parser for the expression language

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    error::{context, convert_error, ContextError, ErrorKind, ParseError, VerboseError},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use serde_json::Value;

use super::ast::{BinaryOp, Expr, Program, TemplatePart, UnaryOp};
use super::builtins::number;
use crate::domain::expression::ExpressionError;

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Parse a full script
pub fn parse_program(source: &str) -> Result<Program, ExpressionError> {
    match all_consuming(program)(source) {
        Ok((_, program)) => Ok(program),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(ExpressionError::Parse(convert_error(source, e)))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(ExpressionError::Parse("incomplete input".to_string()))
        }
    }
}

fn ws<'a, T, F>(inner: F) -> impl FnMut(&'a str) -> ParserResult<'a, T>
where
    F: FnMut(&'a str) -> ParserResult<'a, T>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> ParserResult<'a, &'a str> {
    terminated(tag(word), not(peek(satisfy(is_ident_char))))
}

fn program(input: &str) -> ParserResult<Program> {
    let (input, bindings) = many0(declaration)(input)?;
    let (input, result) = context(
        "result expression",
        ws(preceded(opt(keyword("return")), expression)),
    )(input)?;
    let (input, _) = ws(opt(char(';')))(input)?;
    Ok((input, Program { bindings, result }))
}

fn declaration(input: &str) -> ParserResult<(String, Expr)> {
    context(
        "declaration",
        map(
            tuple((
                ws(alt((keyword("const"), keyword("let"), keyword("var")))),
                ws(identifier),
                char('='),
                expression,
                opt(ws(char(';'))),
            )),
            |(_, name, _, expr, _)| (name, expr),
        ),
    )(input)
}

pub fn expression(input: &str) -> ParserResult<Expr> {
    ws(conditional)(input)
}

fn conditional(input: &str) -> ParserResult<Expr> {
    let (input, test) = logical_or(input)?;
    let mut branches = pair(
        preceded(ws(char('?')), conditional),
        preceded(ws(char(':')), conditional),
    );
    match branches(input) {
        Ok((rest, (then, otherwise))) => Ok((
            rest,
            Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)),
        )),
        Err(nom::Err::Error(_)) => Ok((input, test)),
        Err(e) => Err(e),
    }
}

fn binary_level<'a>(
    input: &'a str,
    operand: fn(&'a str) -> ParserResult<'a, Expr>,
    operator: fn(&'a str) -> ParserResult<'a, BinaryOp>,
) -> ParserResult<'a, Expr> {
    let (mut input, mut left) = operand(input)?;
    loop {
        match pair(ws(operator), operand)(input) {
            Ok((rest, (op, right))) => {
                left = Expr::Binary(op, Box::new(left), Box::new(right));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

fn logical_or(input: &str) -> ParserResult<Expr> {
    binary_level(input, logical_and, |i| {
        alt((
            value(BinaryOp::Or, tag("||")),
            value(BinaryOp::Nullish, tag("??")),
        ))(i)
    })
}

fn logical_and(input: &str) -> ParserResult<Expr> {
    binary_level(input, equality, |i| value(BinaryOp::And, tag("&&"))(i))
}

fn equality(input: &str) -> ParserResult<Expr> {
    binary_level(input, comparison, |i| {
        alt((
            value(BinaryOp::StrictEq, tag("===")),
            value(BinaryOp::StrictNe, tag("!==")),
            value(BinaryOp::Eq, tag("==")),
            value(BinaryOp::Ne, tag("!=")),
        ))(i)
    })
}

fn comparison(input: &str) -> ParserResult<Expr> {
    binary_level(input, additive, |i| {
        alt((
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Lt, tag("<")),
            value(BinaryOp::Gt, tag(">")),
        ))(i)
    })
}

fn additive(input: &str) -> ParserResult<Expr> {
    binary_level(input, multiplicative, |i| {
        alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-'))))(i)
    })
}

fn multiplicative(input: &str) -> ParserResult<Expr> {
    binary_level(input, unary, |i| {
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        ))(i)
    })
}

fn unary(input: &str) -> ParserResult<Expr> {
    let prefixed = |op: UnaryOp| move |e: Expr| Expr::Unary(op, Box::new(e));
    context(
        "unary",
        alt((
            map(preceded(ws(char('!')), unary), prefixed(UnaryOp::Not)),
            map(preceded(ws(char('-')), unary), prefixed(UnaryOp::Neg)),
            map(preceded(ws(char('+')), unary), prefixed(UnaryOp::Plus)),
            map(preceded(ws(keyword("typeof")), unary), prefixed(UnaryOp::TypeOf)),
            postfix,
        )),
    )(input)
}

enum Suffix {
    Member(String),
    Index(Expr),
    Call(Vec<Expr>),
}

fn postfix(input: &str) -> ParserResult<Expr> {
    let (input, base) = ws(primary)(input)?;
    let (input, suffixes) = many0(ws(alt((
        map(preceded(char('.'), identifier), Suffix::Member),
        map(delimited(char('['), expression, char(']')), Suffix::Index),
        map(
            delimited(char('('), separated_list0(char(','), expression), ws(char(')'))),
            Suffix::Call,
        ),
    ))))(input)?;

    let expr = suffixes.into_iter().fold(base, |target, suffix| match suffix {
        Suffix::Member(name) => Expr::Member(Box::new(target), name),
        Suffix::Index(index) => Expr::Index(Box::new(target), Box::new(index)),
        Suffix::Call(args) => Expr::Call(Box::new(target), args),
    });
    Ok((input, expr))
}

fn primary(input: &str) -> ParserResult<Expr> {
    context(
        "primary",
        alt((
            number_literal,
            map(string_literal, |s| Expr::Literal(Value::String(s))),
            template_literal,
            map(
                delimited(char('['), separated_list0(char(','), expression), ws(char(']'))),
                Expr::Array,
            ),
            object_literal,
            delimited(char('('), expression, char(')')),
            map(identifier, |name| match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
        )),
    )(input)
}

fn identifier(input: &str) -> ParserResult<String> {
    context(
        "identifier",
        map(
            recognize(pair(
                satisfy(|c| c.is_alphabetic() || c == '_' || c == '$'),
                take_while(is_ident_char),
            )),
            str::to_string,
        ),
    )(input)
}

fn number_literal(input: &str) -> ParserResult<Expr> {
    context(
        "number",
        map_res(
            recognize(tuple((
                digit1,
                opt(pair(char('.'), digit1)),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            ))),
            |s: &str| s.parse::<f64>().map(|n| Expr::Literal(number(n))),
        ),
    )(input)
}

fn object_literal(input: &str) -> ParserResult<Expr> {
    context(
        "object",
        map(
            delimited(
                char('{'),
                separated_list0(
                    char(','),
                    separated_pair(ws(alt((identifier, string_literal))), char(':'), expression),
                ),
                ws(char('}')),
            ),
            Expr::Object,
        ),
    )(input)
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn string_literal(input: &str) -> ParserResult<String> {
    let quote = match input.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            return Err(nom::Err::Error(VerboseError::from_error_kind(
                input,
                ErrorKind::Char,
            )));
        }
    };

    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, escaped)) => out.push(unescape(escaped)),
                None => break,
            }
        } else {
            out.push(c);
        }
    }

    Err(nom::Err::Failure(VerboseError::add_context(
        input,
        "unterminated string",
        VerboseError::from_error_kind(input, ErrorKind::Char),
    )))
}

fn template_literal(input: &str) -> ParserResult<Expr> {
    let (mut rest, _) = char::<&str, VerboseError<&str>>('`')(input)?;
    let mut parts = Vec::new();
    let mut text = String::new();

    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => {
                return Err(nom::Err::Failure(VerboseError::add_context(
                    input,
                    "unterminated template literal",
                    VerboseError::from_error_kind(input, ErrorKind::Char),
                )));
            }
            Some('`') => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text));
                }
                return Ok((&rest[1..], Expr::Template(parts)));
            }
            Some('\\') => match chars.next() {
                Some(escaped) => {
                    text.push(unescape(escaped));
                    rest = &rest[1 + escaped.len_utf8()..];
                }
                None => {
                    return Err(nom::Err::Failure(VerboseError::from_error_kind(
                        input,
                        ErrorKind::Char,
                    )));
                }
            },
            Some('$') if rest.starts_with("${") => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                let (after, expr) = expression(&rest[2..])?;
                let (after, _) = char::<&str, VerboseError<&str>>('}')(after)?;
                parts.push(TemplatePart::Expr(expr));
                rest = after;
            }
            Some(c) => {
                text.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
}
