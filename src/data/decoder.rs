use std::fmt;

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::hex;

use crate::data::types::{DecodedCall, DecodedParam, TxRef};

/// Why a transaction contributed nothing to address extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingInput,
    MissingFunctionName,
    FunctionNotInAbi(String),
    SelectorMismatch(String),
    MalformedInput,
    DecodeFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInput => write!(f, "no call input"),
            Self::MissingFunctionName => write!(f, "no function name"),
            Self::FunctionNotInAbi(name) => write!(f, "function {name} not in ABI"),
            Self::SelectorMismatch(name) => write!(f, "input selector does not match {name}"),
            Self::MalformedInput => write!(f, "input is not valid hex calldata"),
            Self::DecodeFailed(e) => write!(f, "decode failed: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Decoded(DecodedCall),
    Skipped(SkipReason),
}

impl DecodeOutcome {
    /// Address-typed top-level arguments, lowercase. Empty when skipped.
    pub fn address_arguments(&self) -> Vec<String> {
        match self {
            Self::Decoded(call) => call
                .params
                .iter()
                .filter_map(|p| match &p.value {
                    DynSolValue::Address(a) => Some(format!("{a:#x}")),
                    _ => None,
                })
                .collect(),
            Self::Skipped(_) => Vec::new(),
        }
    }
}

pub struct TxDecoder;

impl TxDecoder {
    /// Decode `tx` against its recipient's ABI, selecting the function by the
    /// name the explorer reported (text before any parenthesis).
    pub fn decode(abi: &JsonAbi, tx: &TxRef) -> DecodeOutcome {
        let Some(name) = tx.function_name.as_deref().and_then(function_name) else {
            return DecodeOutcome::Skipped(SkipReason::MissingFunctionName);
        };
        let Some(input) = tx.input.as_deref().filter(|i| !i.is_empty() && *i != "0x") else {
            return DecodeOutcome::Skipped(SkipReason::MissingInput);
        };
        Self::decode_by_name(abi, name, input)
    }

    /// Decode hex `input` as a call to the function called `name`. Overloads
    /// are told apart by the input's selector.
    pub fn decode_by_name(abi: &JsonAbi, name: &str, input: &str) -> DecodeOutcome {
        let Some(overloads) = abi.function(name).filter(|f| !f.is_empty()) else {
            return DecodeOutcome::Skipped(SkipReason::FunctionNotInAbi(name.to_string()));
        };
        let Ok(data) = hex::decode(input.trim()) else {
            return DecodeOutcome::Skipped(SkipReason::MalformedInput);
        };
        if data.len() < 4 {
            return DecodeOutcome::Skipped(SkipReason::MalformedInput);
        }

        let Some(func) = overloads.iter().find(|f| f.selector().as_slice() == &data[..4]) else {
            return DecodeOutcome::Skipped(SkipReason::SelectorMismatch(name.to_string()));
        };
        match func.abi_decode_input(&data[4..], false) {
            Ok(values) => DecodeOutcome::Decoded(decoded_call(func, values)),
            Err(e) => DecodeOutcome::Skipped(SkipReason::DecodeFailed(e.to_string())),
        }
    }
}

fn function_name(reported: &str) -> Option<&str> {
    let name = reported.split('(').next().unwrap_or_default().trim();
    (!name.is_empty()).then_some(name)
}

fn decoded_call(func: &Function, values: Vec<DynSolValue>) -> DecodedCall {
    let params = func
        .inputs
        .iter()
        .zip(values)
        .map(|(param, value)| DecodedParam {
            name: param.name.clone(),
            kind: param.ty.clone(),
            value,
        })
        .collect();
    DecodedCall {
        function_name: func.name.clone(),
        params,
    }
}

/// Format a dynamic Solidity value to a human-readable string.
pub fn format_sol_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(b, size) => format!("0x{}", hex::encode(&b[..*size])),
        DynSolValue::Address(a) => format!("{a:#x}"),
        DynSolValue::Function(f) => format!("0x{}", hex::encode(f)),
        DynSolValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(arr) | DynSolValue::FixedArray(arr) => {
            let inner: Vec<String> = arr.iter().map(format_sol_value).collect();
            format!("[{}]", inner.join(", "))
        }
        DynSolValue::Tuple(parts) => {
            let inner: Vec<String> = parts.iter().map(format_sol_value).collect();
            format!("({})", inner.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::{HOLDER, erc20_abi, erc20_calldata};
    use alloy::primitives::U256;

    fn transfer_input(to: &str, amount: u64) -> String {
        erc20_calldata("transfer", to, amount)
    }

    fn tx_ref(function_name: &str, input: &str) -> TxRef {
        TxRef {
            function_name: Some(function_name.to_string()),
            input: Some(input.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_transfer() {
        let tx = tx_ref("transfer(address to, uint256 amount)", &transfer_input(HOLDER, 1000));
        let outcome = TxDecoder::decode(&erc20_abi(), &tx);

        let DecodeOutcome::Decoded(call) = &outcome else {
            panic!("expected decoded call, got {outcome:?}");
        };
        assert_eq!(call.function_name, "transfer");
        assert_eq!(call.params.len(), 2);
        assert_eq!(call.params[0].name, "to");
        assert_eq!(call.params[0].kind, "address");
        assert_eq!(format_sol_value(&call.params[1].value), "1000");
        assert_eq!(outcome.address_arguments(), vec![HOLDER.to_string()]);
    }

    #[test]
    fn test_address_arguments_are_lowercase() {
        let mixed = "0xD8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
        let tx = tx_ref("approve", &erc20_calldata("approve", mixed, 1));
        let outcome = TxDecoder::decode(&erc20_abi(), &tx);
        assert_eq!(outcome.address_arguments(), vec![HOLDER.to_string()]);
    }

    #[test]
    fn test_function_not_in_abi() {
        let tx = tx_ref("swapExactTokensForTokens(uint256,uint256)", &transfer_input(HOLDER, 1));
        let outcome = TxDecoder::decode(&erc20_abi(), &tx);
        assert!(matches!(
            outcome,
            DecodeOutcome::Skipped(SkipReason::FunctionNotInAbi(ref name)) if name == "swapExactTokensForTokens"
        ));
        assert!(outcome.address_arguments().is_empty());
    }

    #[test]
    fn test_name_does_not_match_input_selector() {
        // Declared as approve, but the calldata carries transfer's selector.
        let tx = tx_ref("approve", &transfer_input(HOLDER, 1));
        let outcome = TxDecoder::decode(&erc20_abi(), &tx);
        assert!(matches!(outcome, DecodeOutcome::Skipped(SkipReason::SelectorMismatch(_))));
    }

    #[test]
    fn test_truncated_input() {
        let input = transfer_input(HOLDER, 1);
        let tx = tx_ref("transfer", &input[..40]);
        let outcome = TxDecoder::decode(&erc20_abi(), &tx);
        assert!(matches!(outcome, DecodeOutcome::Skipped(SkipReason::DecodeFailed(_))));
    }

    #[test]
    fn test_missing_fields() {
        let abi = erc20_abi();
        let no_name = TxRef {
            input: Some(transfer_input(HOLDER, 1)),
            ..Default::default()
        };
        assert!(matches!(
            TxDecoder::decode(&abi, &no_name),
            DecodeOutcome::Skipped(SkipReason::MissingFunctionName)
        ));
        assert!(matches!(
            TxDecoder::decode(&abi, &tx_ref("transfer", "0x")),
            DecodeOutcome::Skipped(SkipReason::MissingInput)
        ));
        assert!(matches!(
            TxDecoder::decode(&abi, &tx_ref("transfer", "0xzz")),
            DecodeOutcome::Skipped(SkipReason::MalformedInput)
        ));
    }

    #[test]
    fn test_format_sol_value() {
        let values = DynSolValue::Tuple(vec![
            DynSolValue::Bool(true),
            DynSolValue::String("USD Coin".to_string()),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u8), 8),
                DynSolValue::Uint(U256::from(2u8), 8),
            ]),
        ]);
        assert_eq!(format_sol_value(&values), "(true, USD Coin, [1, 2])");
    }
}
