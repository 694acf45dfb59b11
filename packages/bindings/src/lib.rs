use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

#[napi]
pub fn compute_breakpoints(cap_table_json: String) -> NapiResult<String> {
    let cap_table: capstack_core::captable::CapTable =
        serde_json::from_str(&cap_table_json).map_err(to_napi_error)?;
    let output =
        capstack_core::breakpoints::compute_breakpoints(&cap_table).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// OPM allocation
// ---------------------------------------------------------------------------

#[napi]
pub fn value_securities(analysis_json: String, params_json: String) -> NapiResult<String> {
    let analysis: capstack_core::breakpoints::BreakpointAnalysis =
        serde_json::from_str(&analysis_json).map_err(to_napi_error)?;
    let params: capstack_core::opm::BlackScholesParams =
        serde_json::from_str(&params_json).map_err(to_napi_error)?;
    let output =
        capstack_core::opm::value_securities(&analysis, &params).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Backsolve
// ---------------------------------------------------------------------------

#[napi]
pub fn backsolve(analysis_json: String, request_json: String) -> NapiResult<String> {
    let analysis: capstack_core::breakpoints::BreakpointAnalysis =
        serde_json::from_str(&analysis_json).map_err(to_napi_error)?;
    let request: capstack_core::backsolve::BacksolveRequest =
        serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let output =
        capstack_core::backsolve::backsolve(&analysis, &request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
