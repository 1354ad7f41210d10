/// Rendered content for a verification email.
pub struct VerificationEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl VerificationEmail {
    pub fn new(username: &str, code: &str) -> Self {
        Self {
            subject: "Veil | Your verification code".to_string(),
            text: text_template(username, code),
            html: html_template(username, code),
        }
    }
}

fn text_template(username: &str, code: &str) -> String {
    format!(
        "Hi {username},\n\n\
         Your Veil verification code is: {code}\n\n\
         The code expires in one hour. If you did not sign up for Veil,\n\
         you can ignore this email.\n",
    )
}

fn html_template(username: &str, code: &str) -> String {
    format!(
        "<html>\
           <body style=\"font-family: sans-serif;\">\
             <p>Hi {username},</p>\
             <p>Your Veil verification code is:</p>\
             <p style=\"font-size: 24px; letter-spacing: 4px;\"><strong>{code}</strong></p>\
             <p>The code expires in one hour. If you did not sign up for Veil, you can ignore this email.</p>\
           </body>\
         </html>",
    )
}
