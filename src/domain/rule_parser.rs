//! Rule DSL parser.
//!
//! Grammar, informally:
//!
//! ```text
//! chain      := comparison (("and" | "or") comparison)*
//! comparison := operand op operand        op in <= >= == != < >
//! operand    := number | composite | indicator
//! composite  := func "(" operand ("," operand)* ")"
//! indicator  := Name | Name "(" param ("," param)* ")"
//! ```
//!
//! `and` / `or` are only recognised as whitespace-delimited words outside
//! parentheses. The comparison operator is the first one found in the fixed
//! order `<= >= == != < >`. Errors carry the offending fragment and its byte
//! offset in the full rule text.

use crate::domain::error::ParseError;
use crate::domain::indicator;
use crate::domain::ohlcv::is_price_column;
use crate::domain::rule::{
    CompositeFunction, CompositeIndicator, CompositeRule, Comparison, Indicator, Logic, Number,
    Operand, Param, Rule,
};

/// Default source series for indicators that take one.
const DEFAULT_SERIES: &str = "Close";

struct Parser<'a> {
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input }
    }

    fn error(&self, message: impl Into<String>, start: usize, end: usize) -> ParseError {
        ParseError::new(message, &self.input[start..end], start)
    }

    /// Narrows `[start, end)` to exclude surrounding whitespace.
    fn trim(&self, start: usize, end: usize) -> (usize, usize) {
        let text = &self.input[start..end];
        let lead = text.len() - text.trim_start().len();
        let trail = text.len() - text.trim_end().len();
        if lead == text.len() {
            return (start, start);
        }
        (start + lead, end - trail)
    }

    /// Whitespace-separated words as byte spans, with the paren depth at
    /// which each word starts.
    fn words(&self) -> Vec<(usize, usize, i32)> {
        let mut words = Vec::new();
        let mut depth = 0i32;
        let mut word_start: Option<(usize, i32)> = None;
        for (i, ch) in self.input.char_indices() {
            if ch.is_whitespace() {
                if let Some((s, d)) = word_start.take() {
                    words.push((s, i, d));
                }
                continue;
            }
            if word_start.is_none() {
                word_start = Some((i, depth));
            }
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }
        if let Some((s, d)) = word_start {
            words.push((s, self.input.len(), d));
        }
        words
    }

    fn parse_chain(&self) -> Result<CompositeRule, ParseError> {
        let mut segments: Vec<(usize, usize)> = Vec::new();
        let mut logics: Vec<(Logic, usize)> = Vec::new();
        let mut current: Option<(usize, usize)> = None;
        let mut segment_start = 0usize;

        for (s, e, depth) in self.words() {
            let logic = match (&self.input[s..e], depth) {
                ("and", 0) => Some(Logic::And),
                ("or", 0) => Some(Logic::Or),
                _ => None,
            };
            match logic {
                Some(logic) => {
                    let seg = current.take().ok_or_else(|| {
                        self.error(
                            format!("empty rule segment before '{}'", logic.keyword()),
                            segment_start,
                            e,
                        )
                    })?;
                    segments.push(seg);
                    logics.push((logic, s));
                    segment_start = e;
                }
                None => {
                    current = Some(match current {
                        Some((cs, _)) => (cs, e),
                        None => (s, e),
                    });
                }
            }
        }

        match current {
            Some(seg) => segments.push(seg),
            None => {
                let (pos, msg) = match logics.last() {
                    Some((logic, at)) => (*at, format!("empty rule segment after '{}'", logic.keyword())),
                    None => (0, "empty rule".to_string()),
                };
                return Err(self.error(msg, pos, self.input.len()));
            }
        }

        let mut rules = segments
            .iter()
            .map(|&(s, e)| self.parse_comparison(s, e))
            .collect::<Result<Vec<Rule>, ParseError>>()?
            .into_iter();
        let first = rules.next().ok_or_else(|| self.error("empty rule", 0, 0))?;
        let rest = logics.into_iter().map(|(l, _)| l).zip(rules).collect();
        Ok(CompositeRule::chain(first, rest))
    }

    fn parse_comparison(&self, start: usize, end: usize) -> Result<Rule, ParseError> {
        let text = &self.input[start..end];
        for op in Comparison::PRIORITY {
            if let Some(at) = text.find(op.symbol()) {
                let split = start + at;
                let left = self.parse_operand(start, split)?;
                let right = self.parse_operand(split + op.symbol().len(), end)?;
                return Ok(Rule {
                    left,
                    operator: op,
                    right,
                });
            }
        }
        Err(self.error("no comparison operator found", start, end))
    }

    fn parse_operand(&self, start: usize, end: usize) -> Result<Operand, ParseError> {
        let (start, end) = self.trim(start, end);
        if start == end {
            return Err(ParseError::new("missing operand", "", start));
        }
        let text = &self.input[start..end];

        if let Ok(value) = text.parse::<f64>() {
            if !value.is_finite() {
                return Err(self.error("constants must be finite", start, end));
            }
            return Ok(Operand::Constant(Number(value)));
        }

        if let Some(open) = text.find('(') {
            let name = &text[..open];
            if !is_identifier(name) {
                return Err(self.error(format!("malformed indicator name '{}'", name), start, end));
            }
            let open = start + open;
            let close = self.matching_paren(open, end)?;
            if close != end - 1 {
                return Err(self.error("unexpected text after ')'", close + 1, end));
            }
            let args = self.split_args(open + 1, close);
            return self.parse_call(name, args, start, end);
        }

        if is_identifier(text) {
            if let Some(def) = indicator::lookup(text) {
                return self.build_indicator(def, Vec::new(), start, end);
            }
            return Ok(Operand::Indicator(Indicator::column(text)));
        }

        Err(self.error("malformed indicator expression", start, end))
    }

    /// Position of the ')' that closes the '(' at `open`.
    fn matching_paren(&self, open: usize, end: usize) -> Result<usize, ParseError> {
        let mut depth = 0i32;
        for (i, ch) in self.input[open..end].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(open + i);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses", open, end))
    }

    /// Comma-separated argument spans at bracket depth zero, trimmed. Empty
    /// arguments are dropped.
    fn split_args(&self, start: usize, end: usize) -> Vec<(usize, usize)> {
        let mut args = Vec::new();
        let mut depth = 0i32;
        let mut arg_start = start;
        for (i, ch) in self.input[start..end].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                ',' if depth == 0 => {
                    args.push(self.trim(arg_start, start + i));
                    arg_start = start + i + 1;
                }
                _ => {}
            }
        }
        args.push(self.trim(arg_start, end));
        args.into_iter().filter(|(s, e)| s < e).collect()
    }

    fn parse_call(
        &self,
        name: &str,
        args: Vec<(usize, usize)>,
        start: usize,
        end: usize,
    ) -> Result<Operand, ParseError> {
        if let Some(function) = CompositeFunction::from_name(name) {
            return self.parse_composite(function, args, start, end);
        }
        if is_price_column(name) {
            if !args.is_empty() {
                return Err(self.error(
                    format!("price column '{}' takes no parameters", name),
                    start,
                    end,
                ));
            }
            return Ok(Operand::Indicator(Indicator::column(name)));
        }
        match indicator::lookup(name) {
            Some(def) => self.build_indicator(def, args, start, end),
            None => Err(self.error(format!("unknown indicator or function '{}'", name), start, end)),
        }
    }

    fn parse_composite(
        &self,
        function: CompositeFunction,
        args: Vec<(usize, usize)>,
        start: usize,
        end: usize,
    ) -> Result<Operand, ParseError> {
        if args.is_empty() {
            return Err(self.error(
                format!("{} needs at least one operand", function.name()),
                start,
                end,
            ));
        }
        if function.is_binary() && args.len() != 2 {
            return Err(self.error(
                format!(
                    "{} takes exactly two operands, got {}",
                    function.name(),
                    args.len()
                ),
                start,
                end,
            ));
        }
        let operands = args
            .iter()
            .map(|&(s, e)| self.parse_operand(s, e))
            .collect::<Result<Vec<Operand>, ParseError>>()?;

        if function == CompositeFunction::Shift {
            let (s, e) = args[1];
            match operands[1] {
                Operand::Constant(Number(n)) if n >= 0.0 && n.fract() == 0.0 => {}
                _ => {
                    return Err(self.error(
                        "shift period must be a non-negative integer constant",
                        s,
                        e,
                    ));
                }
            }
        }

        Ok(Operand::Composite(CompositeIndicator { function, operands }))
    }

    fn build_indicator(
        &self,
        def: &indicator::IndicatorDef,
        args: Vec<(usize, usize)>,
        start: usize,
        end: usize,
    ) -> Result<Operand, ParseError> {
        let mut series: Option<Param> = None;
        let mut numbers: Vec<f64> = Vec::new();

        for (s, e) in args {
            match self.parse_operand(s, e)? {
                Operand::Constant(Number(n)) => numbers.push(n),
                other if def.takes_series => {
                    if series.is_some() {
                        return Err(self.error(
                            format!("{} takes a single source series", def.name),
                            s,
                            e,
                        ));
                    }
                    series = Some(match other {
                        Operand::Indicator(ind) if ind.is_bare() => Param::Column(ind.name),
                        nested => Param::Nested(Box::new(nested)),
                    });
                }
                _ => {
                    return Err(self.error(
                        format!("{} only takes numeric parameters", def.name),
                        s,
                        e,
                    ));
                }
            }
        }

        if numbers.is_empty() {
            numbers = def.defaults.to_vec();
        }
        def.window_params(&numbers)
            .map_err(|msg| self.error(msg, start, end))?;

        let mut params = Vec::with_capacity(numbers.len() + 1);
        if def.takes_series {
            params.push(series.unwrap_or_else(|| Param::Column(DEFAULT_SERIES.to_string())));
        }
        params.extend(numbers.into_iter().map(|n| Param::Number(Number(n))));
        Ok(Operand::Indicator(Indicator::new(def.name, params)))
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !s.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
}

/// Parses a full rule chain such as `SMA(20) > SMA(100) and Close < 50000`.
pub fn parse_rule(input: &str) -> Result<CompositeRule, ParseError> {
    let chain = Parser::new(input).parse_chain()?;
    tracing::debug!(rule = %chain, "parsed rule");
    Ok(chain)
}

/// Parses a single indicator, composite or constant expression.
pub fn parse_operand(input: &str) -> Result<Operand, ParseError> {
    Parser::new(input).parse_operand(0, input.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ind(name: &str, series: &str, windows: &[f64]) -> Operand {
        let mut params = vec![Param::Column(series.to_string())];
        params.extend(windows.iter().map(|&w| Param::Number(Number(w))));
        Operand::Indicator(Indicator::new(name, params))
    }

    fn col(name: &str) -> Operand {
        Operand::Indicator(Indicator::column(name))
    }

    #[test]
    fn parse_simple_comparison() {
        let chain = parse_rule("Close > SMA(20)").unwrap();
        assert_eq!(chain.rule.left, col("Close"));
        assert_eq!(chain.rule.operator, Comparison::Gt);
        assert_eq!(chain.rule.right, ind("SMA", "Close", &[20.0]));
        assert!(chain.next.is_none());
    }

    #[test]
    fn parse_constant_right_side() {
        let chain = parse_rule("MA_trend(Close, 20, 5) >= -0.01").unwrap();
        assert_eq!(chain.rule.operator, Comparison::Ge);
        assert_eq!(chain.rule.right, Operand::Constant(Number(-0.01)));
    }

    #[test]
    fn operator_priority_prefers_two_char_ops() {
        let cases = [
            ("Close <= Open", Comparison::Le),
            ("Close >= Open", Comparison::Ge),
            ("Close == Open", Comparison::Eq),
            ("Close != Open", Comparison::Ne),
            ("Close < Open", Comparison::Lt),
            ("Close > Open", Comparison::Gt),
        ];
        for (text, op) in cases {
            assert_eq!(parse_rule(text).unwrap().rule.operator, op, "{}", text);
        }
    }

    #[test]
    fn series_defaults_to_close() {
        assert_eq!(parse_operand("EMA(50)").unwrap(), ind("EMA", "Close", &[50.0]));
        assert_eq!(parse_operand("SMA()").unwrap(), ind("SMA", "Close", &[20.0]));
        assert_eq!(parse_operand("SMA").unwrap(), ind("SMA", "Close", &[20.0]));
        assert_eq!(
            parse_operand("Rolling_Low()").unwrap(),
            ind("Rolling_Low", "Close", &[14.0])
        );
        assert_eq!(
            parse_operand("MA_trend()").unwrap(),
            ind("MA_trend", "Close", &[20.0, 5.0])
        );
    }

    #[test]
    fn explicit_series_and_trailing_comma() {
        assert_eq!(
            parse_operand("Rolling_High(Close,14,)").unwrap(),
            ind("Rolling_High", "Close", &[14.0])
        );
        assert_eq!(parse_operand("SMA(High, 10)").unwrap(), ind("SMA", "High", &[10.0]));
        // series may come after the window
        assert_eq!(parse_operand("SMA(10, Low)").unwrap(), ind("SMA", "Low", &[10.0]));
    }

    #[test]
    fn nested_indicator_as_series() {
        let op = parse_operand("SMA(EMA(Close, 10), 5)").unwrap();
        let Operand::Indicator(outer) = op else {
            panic!("expected indicator");
        };
        assert_eq!(outer.to_string(), "SMA(EMA(Close, 10), 5)");
        assert!(matches!(outer.params[0], Param::Nested(_)));
    }

    #[test]
    fn table_indicators() {
        assert_eq!(
            parse_operand("VWAP").unwrap(),
            Operand::Indicator(Indicator::new("VWAP", vec![]))
        );
        assert_eq!(
            parse_operand("VWAP()").unwrap(),
            Operand::Indicator(Indicator::new("VWAP", vec![]))
        );
        assert_eq!(
            parse_operand("Average_Move_From_Open()").unwrap().to_string(),
            "Average_Move_From_Open(14)"
        );
        assert!(parse_operand("VWAP(Close)").is_err());
    }

    #[test]
    fn composite_with_nested_operands() {
        let op = parse_operand("max(SMA(20), divide(Close, shift(Close, 1)), 3)").unwrap();
        let Operand::Composite(c) = op else {
            panic!("expected composite");
        };
        assert_eq!(c.function, CompositeFunction::Max);
        assert_eq!(c.operands.len(), 3);
        assert!(matches!(c.operands[1], Operand::Composite(_)));
        assert_eq!(c.operands[2], Operand::Constant(Number(3.0)));
    }

    #[test]
    fn bare_identifiers_are_column_references() {
        assert_eq!(parse_operand("BTC-USD").unwrap(), col("BTC-USD"));
        assert_eq!(parse_operand("Volume").unwrap(), col("Volume"));
        assert_eq!(parse_operand("Close()").unwrap(), col("Close"));
    }

    #[test]
    fn chain_splits_on_and_or() {
        let chain = parse_rule("SMA(20) > SMA(100) and Close < Rolling_High(Close,14,) or Close > 5")
            .unwrap();
        let links = chain.links();
        assert_eq!(links.len(), 3);
        assert_eq!(links[1].0, Some(Logic::And));
        assert_eq!(links[2].0, Some(Logic::Or));
        assert_eq!(links[2].1.right, Operand::Constant(Number(5.0)));
    }

    #[test]
    fn words_inside_parens_do_not_split() {
        let chain = parse_rule("max(Close, Open) > 1 and Close > 2").unwrap();
        assert_eq!(chain.links().len(), 2);
    }

    #[test]
    fn canonical_round_trip() {
        let text = "Close > SMA(Close, 20) and divide(Close, Open) != 1";
        let chain = parse_rule(text).unwrap();
        assert_eq!(chain.to_string(), text);
        assert_eq!(parse_rule(&chain.to_string()).unwrap(), chain);
    }

    #[test]
    fn error_unknown_indicator() {
        let err = parse_rule("Close > FOO(3)").unwrap_err();
        assert!(err.message.contains("unknown"));
        assert_eq!(err.fragment, "FOO(3)");
        assert_eq!(err.position, 8);
    }

    #[test]
    fn error_missing_operator() {
        let err = parse_rule("Close SMA(20)").unwrap_err();
        assert!(err.message.contains("operator"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn error_missing_operator_in_second_segment() {
        let err = parse_rule("Close > 1 and Close").unwrap_err();
        assert_eq!(err.fragment, "Close");
        assert_eq!(err.position, 14);
    }

    #[test]
    fn error_binary_arity() {
        assert!(parse_operand("subtract(Close)").is_err());
        assert!(parse_operand("divide(Close, Open, High)").is_err());
        assert!(parse_operand("shift(Close)").is_err());
    }

    #[test]
    fn error_shift_period() {
        assert!(parse_operand("shift(Close, 1.5)").is_err());
        assert!(parse_operand("shift(Close, -1)").is_err());
        assert!(parse_operand("shift(Close, Open)").is_err());
        assert!(parse_operand("shift(Close, 0)").is_ok());
    }

    #[test]
    fn error_empty_segments() {
        assert!(parse_rule("").is_err());
        assert!(parse_rule("   ").is_err());
        assert!(parse_rule("and Close > 1").is_err());
        assert!(parse_rule("Close > 1 and").is_err());
        assert!(parse_rule("Close > 1 and or Close < 2").is_err());
    }

    #[test]
    fn error_malformed() {
        assert!(parse_rule("Close > SMA(20").is_err());
        assert!(parse_rule("Close > SMA(20) x").is_err());
        assert!(parse_rule("Close > ").is_err());
        assert!(parse_rule("Close > Close*2").is_err());
    }

    #[test]
    fn error_bad_window() {
        assert!(parse_operand("SMA(2.5)").is_err());
        assert!(parse_operand("SMA(0)").is_err());
        assert!(parse_operand("MA_trend(20)").is_err());
        assert!(parse_operand("SMA(High, Low, 5)").is_err());
    }

    #[test]
    fn error_display_with_context() {
        let input = "Close > FOO(3)";
        let err = parse_rule(input).unwrap_err();
        let display = err.display_with_context(input);
        assert!(display.contains("        ^"));
    }
}
