//! Variable kinds addressable by rules and macros.

use crate::error::{Error, Result};

/// Storage and iteration shape of a variable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One scalar value.
    Single,
    /// Ordered multi-map of key/value pairs.
    Map,
    /// Read-only view yielding the key names of a backing map.
    KeyedView,
    /// Read-only union over several backing maps.
    ConcatKeyed,
    /// Computed byte-size aggregate.
    Size,
    /// Clock-derived scalar.
    Time,
}

/// Every variable kind the engine can resolve.
///
/// Names follow the classic SecLang spelling, upper-case with underscores.
/// `Unknown` is internal and carries synthetic matches for operator-less
/// rules; it has no parseable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum VariableKind {
    // Scalars.
    AuthType,
    Duration,
    FullRequest,
    FullRequestLength,
    HighestSeverity,
    InboundDataError,
    MatchedVar,
    MatchedVarName,
    MultipartBoundaryQuoted,
    MultipartBoundaryWhitespace,
    MultipartCrlfLfLines,
    MultipartDataAfter,
    MultipartDataBefore,
    MultipartFileLimitExceeded,
    MultipartHeaderFolding,
    MultipartInvalidHeaderFolding,
    MultipartInvalidPart,
    MultipartInvalidQuoting,
    MultipartLfLine,
    MultipartMissingSemicolon,
    MultipartStrictError,
    MultipartUnmatchedBoundary,
    OutboundDataError,
    PathInfo,
    QueryString,
    RemoteAddr,
    RemoteHost,
    RemotePort,
    ReqbodyError,
    ReqbodyErrorMsg,
    ReqbodyProcessor,
    ReqbodyProcessorError,
    ReqbodyProcessorErrorMsg,
    RequestBasename,
    RequestBody,
    RequestBodyLength,
    RequestFilename,
    RequestLine,
    RequestMethod,
    RequestProtocol,
    RequestUri,
    RequestUriRaw,
    ResbodyError,
    ResbodyErrorMsg,
    ResbodyProcessor,
    ResbodyProcessorError,
    ResbodyProcessorErrorMsg,
    ResponseBody,
    ResponseContentLength,
    ResponseContentType,
    ResponseProtocol,
    ResponseStatus,
    ServerAddr,
    ServerName,
    ServerPort,
    SessionId,
    StatusLine,
    UniqueId,
    UrlencodedError,
    UserId,
    Unknown,

    // Clock-derived scalars.
    Time,
    TimeDay,
    TimeEpoch,
    TimeHour,
    TimeMin,
    TimeMon,
    TimeSec,
    TimeWday,
    TimeYear,

    // Size aggregates.
    ArgsCombinedSize,
    FilesCombinedSize,

    // Maps.
    ArgsGet,
    ArgsPath,
    ArgsPost,
    Env,
    Files,
    FilesNames,
    FilesSizes,
    FilesTmpContent,
    FilesTmpNames,
    Geo,
    Json,
    MatchedVars,
    MatchedVarsNames,
    MultipartFilename,
    MultipartName,
    MultipartPartHeaders,
    RequestCookies,
    RequestHeaders,
    ResponseArgs,
    ResponseHeaders,
    ResponseXml,
    Rule,
    Tx,
    Xml,

    // Name views over maps.
    ArgsGetNames,
    ArgsNames,
    ArgsPostNames,
    RequestCookiesNames,
    RequestHeadersNames,
    ResponseHeadersNames,

    // Unions over maps.
    Args,
}

impl VariableKind {
    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            VariableKind::Args => "ARGS",
            VariableKind::ArgsCombinedSize => "ARGS_COMBINED_SIZE",
            VariableKind::ArgsGet => "ARGS_GET",
            VariableKind::ArgsGetNames => "ARGS_GET_NAMES",
            VariableKind::ArgsNames => "ARGS_NAMES",
            VariableKind::ArgsPath => "ARGS_PATH",
            VariableKind::ArgsPost => "ARGS_POST",
            VariableKind::ArgsPostNames => "ARGS_POST_NAMES",
            VariableKind::AuthType => "AUTH_TYPE",
            VariableKind::Duration => "DURATION",
            VariableKind::Env => "ENV",
            VariableKind::Files => "FILES",
            VariableKind::FilesCombinedSize => "FILES_COMBINED_SIZE",
            VariableKind::FilesNames => "FILES_NAMES",
            VariableKind::FilesSizes => "FILES_SIZES",
            VariableKind::FilesTmpContent => "FILES_TMP_CONTENT",
            VariableKind::FilesTmpNames => "FILES_TMPNAMES",
            VariableKind::FullRequest => "FULL_REQUEST",
            VariableKind::FullRequestLength => "FULL_REQUEST_LENGTH",
            VariableKind::Geo => "GEO",
            VariableKind::HighestSeverity => "HIGHEST_SEVERITY",
            VariableKind::InboundDataError => "INBOUND_DATA_ERROR",
            VariableKind::Json => "JSON",
            VariableKind::MatchedVar => "MATCHED_VAR",
            VariableKind::MatchedVarName => "MATCHED_VAR_NAME",
            VariableKind::MatchedVars => "MATCHED_VARS",
            VariableKind::MatchedVarsNames => "MATCHED_VARS_NAMES",
            VariableKind::MultipartBoundaryQuoted => "MULTIPART_BOUNDARY_QUOTED",
            VariableKind::MultipartBoundaryWhitespace => "MULTIPART_BOUNDARY_WHITESPACE",
            VariableKind::MultipartCrlfLfLines => "MULTIPART_CRLF_LF_LINES",
            VariableKind::MultipartDataAfter => "MULTIPART_DATA_AFTER",
            VariableKind::MultipartDataBefore => "MULTIPART_DATA_BEFORE",
            VariableKind::MultipartFileLimitExceeded => "MULTIPART_FILE_LIMIT_EXCEEDED",
            VariableKind::MultipartFilename => "MULTIPART_FILENAME",
            VariableKind::MultipartHeaderFolding => "MULTIPART_HEADER_FOLDING",
            VariableKind::MultipartInvalidHeaderFolding => "MULTIPART_INVALID_HEADER_FOLDING",
            VariableKind::MultipartInvalidPart => "MULTIPART_INVALID_PART",
            VariableKind::MultipartInvalidQuoting => "MULTIPART_INVALID_QUOTING",
            VariableKind::MultipartLfLine => "MULTIPART_LF_LINE",
            VariableKind::MultipartMissingSemicolon => "MULTIPART_MISSING_SEMICOLON",
            VariableKind::MultipartName => "MULTIPART_NAME",
            VariableKind::MultipartPartHeaders => "MULTIPART_PART_HEADERS",
            VariableKind::MultipartStrictError => "MULTIPART_STRICT_ERROR",
            VariableKind::MultipartUnmatchedBoundary => "MULTIPART_UNMATCHED_BOUNDARY",
            VariableKind::OutboundDataError => "OUTBOUND_DATA_ERROR",
            VariableKind::PathInfo => "PATH_INFO",
            VariableKind::QueryString => "QUERY_STRING",
            VariableKind::RemoteAddr => "REMOTE_ADDR",
            VariableKind::RemoteHost => "REMOTE_HOST",
            VariableKind::RemotePort => "REMOTE_PORT",
            VariableKind::ReqbodyError => "REQBODY_ERROR",
            VariableKind::ReqbodyErrorMsg => "REQBODY_ERROR_MSG",
            VariableKind::ReqbodyProcessor => "REQBODY_PROCESSOR",
            VariableKind::ReqbodyProcessorError => "REQBODY_PROCESSOR_ERROR",
            VariableKind::ReqbodyProcessorErrorMsg => "REQBODY_PROCESSOR_ERROR_MSG",
            VariableKind::RequestBasename => "REQUEST_BASENAME",
            VariableKind::RequestBody => "REQUEST_BODY",
            VariableKind::RequestBodyLength => "REQUEST_BODY_LENGTH",
            VariableKind::RequestCookies => "REQUEST_COOKIES",
            VariableKind::RequestCookiesNames => "REQUEST_COOKIES_NAMES",
            VariableKind::RequestFilename => "REQUEST_FILENAME",
            VariableKind::RequestHeaders => "REQUEST_HEADERS",
            VariableKind::RequestHeadersNames => "REQUEST_HEADERS_NAMES",
            VariableKind::RequestLine => "REQUEST_LINE",
            VariableKind::RequestMethod => "REQUEST_METHOD",
            VariableKind::RequestProtocol => "REQUEST_PROTOCOL",
            VariableKind::RequestUri => "REQUEST_URI",
            VariableKind::RequestUriRaw => "REQUEST_URI_RAW",
            VariableKind::ResbodyError => "RESBODY_ERROR",
            VariableKind::ResbodyErrorMsg => "RESBODY_ERROR_MSG",
            VariableKind::ResbodyProcessor => "RESBODY_PROCESSOR",
            VariableKind::ResbodyProcessorError => "RESBODY_PROCESSOR_ERROR",
            VariableKind::ResbodyProcessorErrorMsg => "RESBODY_PROCESSOR_ERROR_MSG",
            VariableKind::ResponseArgs => "RESPONSE_ARGS",
            VariableKind::ResponseBody => "RESPONSE_BODY",
            VariableKind::ResponseContentLength => "RESPONSE_CONTENT_LENGTH",
            VariableKind::ResponseContentType => "RESPONSE_CONTENT_TYPE",
            VariableKind::ResponseHeaders => "RESPONSE_HEADERS",
            VariableKind::ResponseHeadersNames => "RESPONSE_HEADERS_NAMES",
            VariableKind::ResponseProtocol => "RESPONSE_PROTOCOL",
            VariableKind::ResponseStatus => "RESPONSE_STATUS",
            VariableKind::ResponseXml => "RESPONSE_XML",
            VariableKind::Rule => "RULE",
            VariableKind::ServerAddr => "SERVER_ADDR",
            VariableKind::ServerName => "SERVER_NAME",
            VariableKind::ServerPort => "SERVER_PORT",
            VariableKind::SessionId => "SESSIONID",
            VariableKind::StatusLine => "STATUS_LINE",
            VariableKind::Time => "TIME",
            VariableKind::TimeDay => "TIME_DAY",
            VariableKind::TimeEpoch => "TIME_EPOCH",
            VariableKind::TimeHour => "TIME_HOUR",
            VariableKind::TimeMin => "TIME_MIN",
            VariableKind::TimeMon => "TIME_MON",
            VariableKind::TimeSec => "TIME_SEC",
            VariableKind::TimeWday => "TIME_WDAY",
            VariableKind::TimeYear => "TIME_YEAR",
            VariableKind::Tx => "TX",
            VariableKind::UniqueId => "UNIQUE_ID",
            VariableKind::Unknown => "UNKNOWN",
            VariableKind::UrlencodedError => "URLENCODED_ERROR",
            VariableKind::UserId => "USERID",
            VariableKind::Xml => "XML",
        }
    }

    /// Parse a variable name, case-insensitive. `Unknown` is not parseable.
    pub fn parse(name: &str) -> Result<VariableKind> {
        let upper = name.to_ascii_uppercase();
        let kind = match upper.as_str() {
            "ARGS" => VariableKind::Args,
            "ARGS_COMBINED_SIZE" => VariableKind::ArgsCombinedSize,
            "ARGS_GET" => VariableKind::ArgsGet,
            "ARGS_GET_NAMES" => VariableKind::ArgsGetNames,
            "ARGS_NAMES" => VariableKind::ArgsNames,
            "ARGS_PATH" => VariableKind::ArgsPath,
            "ARGS_POST" => VariableKind::ArgsPost,
            "ARGS_POST_NAMES" => VariableKind::ArgsPostNames,
            "AUTH_TYPE" => VariableKind::AuthType,
            "DURATION" => VariableKind::Duration,
            "ENV" => VariableKind::Env,
            "FILES" => VariableKind::Files,
            "FILES_COMBINED_SIZE" => VariableKind::FilesCombinedSize,
            "FILES_NAMES" => VariableKind::FilesNames,
            "FILES_SIZES" => VariableKind::FilesSizes,
            "FILES_TMP_CONTENT" => VariableKind::FilesTmpContent,
            "FILES_TMPNAMES" => VariableKind::FilesTmpNames,
            "FULL_REQUEST" => VariableKind::FullRequest,
            "FULL_REQUEST_LENGTH" => VariableKind::FullRequestLength,
            "GEO" => VariableKind::Geo,
            "HIGHEST_SEVERITY" => VariableKind::HighestSeverity,
            "INBOUND_DATA_ERROR" => VariableKind::InboundDataError,
            "JSON" => VariableKind::Json,
            "MATCHED_VAR" => VariableKind::MatchedVar,
            "MATCHED_VAR_NAME" => VariableKind::MatchedVarName,
            "MATCHED_VARS" => VariableKind::MatchedVars,
            "MATCHED_VARS_NAMES" => VariableKind::MatchedVarsNames,
            "MULTIPART_BOUNDARY_QUOTED" => VariableKind::MultipartBoundaryQuoted,
            "MULTIPART_BOUNDARY_WHITESPACE" => VariableKind::MultipartBoundaryWhitespace,
            "MULTIPART_CRLF_LF_LINES" => VariableKind::MultipartCrlfLfLines,
            "MULTIPART_DATA_AFTER" => VariableKind::MultipartDataAfter,
            "MULTIPART_DATA_BEFORE" => VariableKind::MultipartDataBefore,
            "MULTIPART_FILE_LIMIT_EXCEEDED" => VariableKind::MultipartFileLimitExceeded,
            "MULTIPART_FILENAME" => VariableKind::MultipartFilename,
            "MULTIPART_HEADER_FOLDING" => VariableKind::MultipartHeaderFolding,
            "MULTIPART_INVALID_HEADER_FOLDING" => VariableKind::MultipartInvalidHeaderFolding,
            "MULTIPART_INVALID_PART" => VariableKind::MultipartInvalidPart,
            "MULTIPART_INVALID_QUOTING" => VariableKind::MultipartInvalidQuoting,
            "MULTIPART_LF_LINE" => VariableKind::MultipartLfLine,
            "MULTIPART_MISSING_SEMICOLON" => VariableKind::MultipartMissingSemicolon,
            "MULTIPART_NAME" => VariableKind::MultipartName,
            "MULTIPART_PART_HEADERS" => VariableKind::MultipartPartHeaders,
            "MULTIPART_STRICT_ERROR" => VariableKind::MultipartStrictError,
            "MULTIPART_UNMATCHED_BOUNDARY" => VariableKind::MultipartUnmatchedBoundary,
            "OUTBOUND_DATA_ERROR" => VariableKind::OutboundDataError,
            "PATH_INFO" => VariableKind::PathInfo,
            "QUERY_STRING" => VariableKind::QueryString,
            "REMOTE_ADDR" => VariableKind::RemoteAddr,
            "REMOTE_HOST" => VariableKind::RemoteHost,
            "REMOTE_PORT" => VariableKind::RemotePort,
            "REQBODY_ERROR" => VariableKind::ReqbodyError,
            "REQBODY_ERROR_MSG" => VariableKind::ReqbodyErrorMsg,
            "REQBODY_PROCESSOR" => VariableKind::ReqbodyProcessor,
            "REQBODY_PROCESSOR_ERROR" => VariableKind::ReqbodyProcessorError,
            "REQBODY_PROCESSOR_ERROR_MSG" => VariableKind::ReqbodyProcessorErrorMsg,
            "REQUEST_BASENAME" => VariableKind::RequestBasename,
            "REQUEST_BODY" => VariableKind::RequestBody,
            "REQUEST_BODY_LENGTH" => VariableKind::RequestBodyLength,
            "REQUEST_COOKIES" => VariableKind::RequestCookies,
            "REQUEST_COOKIES_NAMES" => VariableKind::RequestCookiesNames,
            "REQUEST_FILENAME" => VariableKind::RequestFilename,
            "REQUEST_HEADERS" => VariableKind::RequestHeaders,
            "REQUEST_HEADERS_NAMES" => VariableKind::RequestHeadersNames,
            "REQUEST_LINE" => VariableKind::RequestLine,
            "REQUEST_METHOD" => VariableKind::RequestMethod,
            "REQUEST_PROTOCOL" => VariableKind::RequestProtocol,
            "REQUEST_URI" => VariableKind::RequestUri,
            "REQUEST_URI_RAW" => VariableKind::RequestUriRaw,
            "RESBODY_ERROR" => VariableKind::ResbodyError,
            "RESBODY_ERROR_MSG" => VariableKind::ResbodyErrorMsg,
            "RESBODY_PROCESSOR" => VariableKind::ResbodyProcessor,
            "RESBODY_PROCESSOR_ERROR" => VariableKind::ResbodyProcessorError,
            "RESBODY_PROCESSOR_ERROR_MSG" => VariableKind::ResbodyProcessorErrorMsg,
            "RESPONSE_ARGS" => VariableKind::ResponseArgs,
            "RESPONSE_BODY" => VariableKind::ResponseBody,
            "RESPONSE_CONTENT_LENGTH" => VariableKind::ResponseContentLength,
            "RESPONSE_CONTENT_TYPE" => VariableKind::ResponseContentType,
            "RESPONSE_HEADERS" => VariableKind::ResponseHeaders,
            "RESPONSE_HEADERS_NAMES" => VariableKind::ResponseHeadersNames,
            "RESPONSE_PROTOCOL" => VariableKind::ResponseProtocol,
            "RESPONSE_STATUS" => VariableKind::ResponseStatus,
            "RESPONSE_XML" => VariableKind::ResponseXml,
            "RULE" => VariableKind::Rule,
            "SERVER_ADDR" => VariableKind::ServerAddr,
            "SERVER_NAME" => VariableKind::ServerName,
            "SERVER_PORT" => VariableKind::ServerPort,
            "SESSIONID" => VariableKind::SessionId,
            "STATUS_LINE" => VariableKind::StatusLine,
            "TIME" => VariableKind::Time,
            "TIME_DAY" => VariableKind::TimeDay,
            "TIME_EPOCH" => VariableKind::TimeEpoch,
            "TIME_HOUR" => VariableKind::TimeHour,
            "TIME_MIN" => VariableKind::TimeMin,
            "TIME_MON" => VariableKind::TimeMon,
            "TIME_SEC" => VariableKind::TimeSec,
            "TIME_WDAY" => VariableKind::TimeWday,
            "TIME_YEAR" => VariableKind::TimeYear,
            "TX" => VariableKind::Tx,
            "UNIQUE_ID" => VariableKind::UniqueId,
            "URLENCODED_ERROR" => VariableKind::UrlencodedError,
            "USERID" => VariableKind::UserId,
            "XML" => VariableKind::Xml,
            _ => {
                return Err(Error::UnknownVariable {
                    name: name.to_string(),
                })
            }
        };
        Ok(kind)
    }

    /// Storage shape of this kind.
    pub fn shape(&self) -> Shape {
        use VariableKind::*;
        match self {
            Args => Shape::ConcatKeyed,
            ArgsCombinedSize | FilesCombinedSize => Shape::Size,
            Time | TimeDay | TimeEpoch | TimeHour | TimeMin | TimeMon | TimeSec | TimeWday
            | TimeYear => Shape::Time,
            ArgsGet | ArgsPath | ArgsPost | Env | Files | FilesNames | FilesSizes
            | FilesTmpContent | FilesTmpNames | Geo | Json | MatchedVars | MatchedVarsNames
            | MultipartFilename | MultipartName | MultipartPartHeaders | RequestCookies
            | RequestHeaders | ResponseArgs | ResponseHeaders | ResponseXml | Rule | Tx | Xml => {
                Shape::Map
            }
            ArgsGetNames | ArgsNames | ArgsPostNames | RequestCookiesNames
            | RequestHeadersNames | ResponseHeadersNames => Shape::KeyedView,
            _ => Shape::Single,
        }
    }

    /// Whether the kind accepts a key selector (`KIND:key`).
    pub fn is_keyed(&self) -> bool {
        matches!(
            self.shape(),
            Shape::Map | Shape::KeyedView | Shape::ConcatKeyed
        )
    }

    /// Earliest phase at which this kind carries data.
    #[cfg(feature = "multiphase")]
    pub(crate) fn min_phase(&self) -> crate::engine::Phase {
        use crate::engine::Phase;
        use VariableKind::*;
        match self {
            ArgsPost | ArgsPostNames | RequestBody | RequestBodyLength | Files
            | FilesCombinedSize | FilesNames | FilesSizes | FilesTmpContent | FilesTmpNames
            | MultipartBoundaryQuoted | MultipartBoundaryWhitespace | MultipartCrlfLfLines
            | MultipartDataAfter | MultipartDataBefore | MultipartFileLimitExceeded
            | MultipartFilename | MultipartHeaderFolding | MultipartInvalidHeaderFolding
            | MultipartInvalidPart | MultipartInvalidQuoting | MultipartLfLine
            | MultipartMissingSemicolon | MultipartName | MultipartPartHeaders
            | MultipartStrictError | MultipartUnmatchedBoundary | Xml | Json | ReqbodyError
            | ReqbodyErrorMsg | ReqbodyProcessorError | ReqbodyProcessorErrorMsg
            | InboundDataError | FullRequest | FullRequestLength | ArgsCombinedSize | Args
            | ArgsNames => Phase::RequestBody,
            ResponseStatus | ResponseProtocol | ResponseHeaders | ResponseHeadersNames
            | ResponseContentType | StatusLine => Phase::ResponseHeaders,
            ResponseBody | ResponseContentLength | ResponseArgs | ResponseXml | ResbodyError
            | ResbodyErrorMsg | ResbodyProcessorError | ResbodyProcessorErrorMsg
            | OutboundDataError => Phase::ResponseBody,
            _ => Phase::RequestHeaders,
        }
    }
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
