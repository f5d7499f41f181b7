//! The static `env`-namespace import table (§6.2).
//!
//! Each entry is a name the guest may import from `env`. The table's only
//! job is to answer "is this a function we provide" during module linking —
//! `Engine::new_app` walks the module's import section and fails with
//! `LinkError` the moment it finds an import that isn't here. The actual
//! gas/call behaviour behind each name lives in `crate::host`, wired onto a
//! `wasmi::Linker` by `Engine::new_app`; this table exists so link failures
//! are caught with a precise name before a single host closure runs.

/// One entry in the host ABI registry: a name and its declared arity, purely
/// for documentation and future signature-checking; the registry does not
/// itself perform gas accounting or dispatch (see module docs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostFunctionSpec {
    /// Import name as it appears in the module's `env` namespace.
    pub name: &'static str,
    /// Number of `i32`/`i64` parameters the guest-visible signature takes.
    pub arity: usize,
}

macro_rules! spec {
    ($name:literal, $arity:literal) => {
        HostFunctionSpec {
            name: $name,
            arity: $arity,
        }
    };
}

/// Every name a module may import from `env` (§6.2, abridged list expanded
/// to every family in §4.4).
pub const REGISTRY: &[HostFunctionSpec] = &[
    // Memory / string
    spec!("memcpy", 3),
    spec!("memset", 3),
    spec!("memmove", 3),
    spec!("memcmp", 3),
    spec!("strcmp", 2),
    spec!("strcpy", 2),
    spec!("strlen", 1),
    spec!("strconcat", 2),
    spec!("malloc", 1),
    spec!("calloc", 2),
    spec!("realloc", 2),
    spec!("free", 1),
    // Number parsing
    spec!("atoi", 1),
    spec!("atoi64", 1),
    spec!("atof32", 1),
    spec!("atof64", 1),
    spec!("itoa", 1),
    spec!("i64toa", 1),
    // BigInt
    spec!("TC_BigIntAdd", 2),
    spec!("TC_BigIntSub", 2),
    spec!("TC_BigIntMul", 2),
    spec!("TC_BigIntDiv", 2),
    spec!("TC_BigIntMod", 2),
    spec!("TC_BigIntCmp", 2),
    spec!("TC_BigIntToInt64", 1),
    // Crypto / hash
    spec!("TC_Keccak256", 2),
    spec!("TC_Sha256", 2),
    spec!("TC_Ripemd160", 2),
    spec!("TC_Ecrecover", 4),
    spec!("TC_CheckSign", 4),
    // Context
    spec!("TC_GetMsgSender", 0),
    spec!("TC_GetMsgSign", 0),
    spec!("TC_GetMsgData", 0),
    spec!("TC_GetMsgGas", 0),
    spec!("TC_GetMsgValue", 0),
    spec!("TC_GetMsgTokenValue", 0),
    spec!("TC_GetTxOrigin", 0),
    spec!("TC_GetTxGasPrice", 0),
    spec!("TC_GetCoinbase", 0),
    spec!("TC_GetGasLimit", 0),
    spec!("TC_GetNumber", 0),
    spec!("TC_GetTimestamp", 0),
    spec!("TC_Now", 0),
    spec!("TC_BlockHash", 1),
    spec!("TC_GasLeft", 0),
    spec!("TC_GetSelfAddress", 0),
    spec!("TC_TokenAddress", 0),
    spec!("TC_IsHexAddress", 1),
    // Control
    spec!("TC_Assert", 1),
    spec!("TC_Require", 1),
    spec!("TC_RequireWithMsg", 2),
    spec!("TC_Revert", 0),
    spec!("TC_RevertWithMsg", 1),
    spec!("exit", 1),
    spec!("abort", 0),
    spec!("TC_Payable", 1),
    // State
    spec!("TC_StorageSet", 2),
    spec!("TC_StorageSetString", 2),
    spec!("TC_StorageSetBytes", 2),
    spec!("TC_StoragePureSetString", 2),
    spec!("TC_StoragePureSetBytes", 2),
    spec!("TC_StorageGet", 1),
    spec!("TC_StorageGetString", 1),
    spec!("TC_StorageGetBytes", 1),
    spec!("TC_StoragePureGetString", 1),
    spec!("TC_StoragePureGetBytes", 1),
    spec!("TC_StorageDel", 1),
    spec!("TC_ContractStorageGet", 2),
    // Logs
    spec!("TC_Log0", 2),
    spec!("TC_Log1", 3),
    spec!("TC_Log2", 4),
    spec!("TC_Log3", 5),
    spec!("TC_Log4", 6),
    spec!("TC_Notify", 2),
    spec!("TC_Prints", 1),
    spec!("TC_Printsl", 2),
    // Balances / transfers
    spec!("TC_GetBalance", 1),
    spec!("TC_Transfer", 2),
    spec!("TC_TransferToken", 3),
    spec!("TC_TokenBalance", 2),
    spec!("TC_Issue", 1),
    spec!("TC_SelfDestruct", 1),
    // Cross-contract
    spec!("TC_CallContract", 3),
    spec!("TC_DelegateCallContract", 3),
    // JSON
    spec!("TC_JsonParse", 1),
    spec!("TC_JsonGetString", 2),
    spec!("TC_JsonGetInt", 2),
    spec!("TC_JsonGetBool", 2),
    spec!("TC_JsonGetObject", 2),
    spec!("TC_JsonNewObject", 0),
    spec!("TC_JsonPutString", 3),
    spec!("TC_JsonPutInt", 3),
    spec!("TC_JsonPutBool", 3),
    spec!("TC_JsonPutObject", 3),
    spec!("TC_JsonToString", 1),
];

/// True when `name` is a recognised `env`-namespace import.
#[must_use]
pub fn is_registered(name: &str) -> bool {
    REGISTRY.iter().any(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_is_registered() {
        assert!(is_registered("TC_Keccak256"));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(!is_registered("TC_DoesNotExist"));
    }

    #[test]
    fn no_duplicate_names() {
        let mut names: Vec<_> = REGISTRY.iter().map(|s| s.name).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(before, names.len());
    }
}
