use winnow::ascii::{space0, space1};
use winnow::combinator::{alt, dispatch, empty, eof, fail, opt, preceded, terminated};
use winnow::error::{ContextError, ParseError, StrContext, StrContextValue};
use winnow::token::{any, take_while};
use winnow::{ModalResult, Parser};

#[derive(thiserror::Error, Debug)]
pub enum TraceParseError<'a> {
    #[error("{0}")]
    ParseError(ParseError<&'a str, ContextError>),
}

/// Kind of memory reference recorded in a trace.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `I`: instruction fetch, not simulated.
    Instruction,
    /// `L`: data load.
    Load,
    /// `S`: data store.
    Store,
    /// `M`: data modify, a load followed by a store to the same address.
    Modify,
}

impl Operation {
    /// Number of memory references the operation makes against the data cache.
    pub fn references(&self) -> usize {
        match self {
            Operation::Instruction => 0,
            Operation::Load | Operation::Store => 1,
            Operation::Modify => 2,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Instruction => "I",
            Operation::Load => "L",
            Operation::Store => "S",
            Operation::Modify => "M",
        })
    }
}

/// One line of a trace, e.g. ` L 7ff000abc,8`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Record {
    pub operation: Operation,
    pub address: u64,
    /// Number of bytes accessed, not used by the simulation.
    pub size: u64,
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:x},{}", self.operation, self.address, self.size)
    }
}

impl<'a> TryFrom<&'a str> for Record {
    type Error = TraceParseError<'a>;

    fn try_from(line: &'a str) -> Result<Self, Self::Error> {
        record.parse(line).map_err(TraceParseError::ParseError)
    }
}

fn record(input: &mut &str) -> ModalResult<Record> {
    terminated(
        (
            preceded(space0, operation),
            preceded(space1, address),
            preceded(','.context(StrContext::Label("size separator")), size),
        ),
        (space0, line_end),
    )
    .map(|(operation, address, size)| Record {
        operation,
        address,
        size,
    })
    .parse_next(input)
}

fn operation(input: &mut &str) -> ModalResult<Operation> {
    dispatch! {any;
        'I' => empty.value(Operation::Instruction),
        'L' => empty.value(Operation::Load),
        'S' => empty.value(Operation::Store),
        'M' => empty.value(Operation::Modify),
        _ => fail::<_, Operation, _>,
    }
    .context(StrContext::Label("operation"))
    .context(StrContext::Expected(StrContextValue::Description(
        "one of I, L, S or M",
    )))
    .parse_next(input)
}

fn address(input: &mut &str) -> ModalResult<u64> {
    // same as scanf's %lx, which takes an optional prefix
    preceded(
        opt(alt(("0x", "0X"))),
        take_while(1.., ('0'..='9', 'a'..='f', 'A'..='F')),
    )
    .try_map(|s| u64::from_str_radix(s, 16))
    .context(StrContext::Label("address"))
    .context(StrContext::Expected(StrContextValue::Description(
        "a hexadecimal address of at most 64 bits",
    )))
    .parse_next(input)
}

fn size(input: &mut &str) -> ModalResult<u64> {
    take_while(1.., '0'..='9')
        .try_map(str::parse::<u64>)
        .context(StrContext::Label("size"))
        .parse_next(input)
}

fn line_end<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    // tolerate traces written with CRLF line endings
    preceded(take_while(0..=1, '\r'), eof)
        .context(StrContext::Label("end of record"))
        .parse_next(input)
}
