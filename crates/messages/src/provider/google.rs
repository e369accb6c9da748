//! Google Gemini `generateContent` format.
//!
//! Gemini never assigns ids to function calls, responses are matched by function
//! name. The decoders therefore borrow the conversation's
//! [`ToolCallTracker`](crate::ToolCallTracker) to hand out ids.

mod input;
mod output;

pub use self::{
    input::{GoogleEncoder, GoogleFunctionDeclaration, GoogleTool},
    output::{
        GoogleBlob, GoogleCandidate, GoogleContent, GoogleDecoder, GoogleFinishReason, GoogleFunctionCall,
        GoogleFunctionResponse, GoogleGenerateResponse, GooglePart, GoogleRole, GoogleStreamDecoder,
        GoogleUsageMetadata,
    },
};
